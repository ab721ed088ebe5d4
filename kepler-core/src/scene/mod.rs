//! Scene intermediate representation: semantic objects plus geometric
//! constraints, independent of rendering.
//!
//! Scene objects reference plan entities by id; constraints reference scene
//! object ids only. Layer ordering determines draw order.

pub mod builder;
pub mod interpreters;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SceneError};
use crate::plan::LayoutConstraint;
use crate::types::{Domain, Position};

pub use builder::{BuilderInput, SceneBuilder};
pub use interpreters::{interpreter_for, DomainInterpreter, InterpreterInput};

pub const SCENE_VERSION: &str = "1.0";

// ── Primitive types ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrimitiveType {
    // Generic
    Rectangle,
    Circle,
    Line,
    Polygon,
    Arc,
    Arrow,
    Text,
    // Domain-specific
    Battery,
    Capacitor,
    CapacitorPlate,
    Resistor,
    Switch,
    Ground,
    Charge,
    Spring,
    Mass,
    Pulley,
    InclinedPlane,
    Lens,
    Mirror,
    Ray,
    Beaker,
    Molecule,
}

/// Draw layers, back to front.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RenderLayer {
    Background,
    Fill,
    Shapes,
    Lines,
    Arrows,
    Annotations,
    Labels,
    Foreground,
}

impl RenderLayer {
    pub const ALL: [RenderLayer; 8] = [
        Self::Background,
        Self::Fill,
        Self::Shapes,
        Self::Lines,
        Self::Arrows,
        Self::Annotations,
        Self::Labels,
        Self::Foreground,
    ];
}

// ── Objects ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStyle {
    pub fill: String,
    pub stroke: String,
    pub stroke_width: f64,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

fn default_opacity() -> f64 {
    1.0
}

impl Default for ObjectStyle {
    fn default() -> Self {
        Self {
            fill: "#f2f2f2".to_string(),
            stroke: "#333333".to_string(),
            stroke_width: 1.5,
            opacity: 1.0,
        }
    }
}

/// One drawable scene object.
///
/// `position` is where the object sits; dimensions and every other "what"
/// live in `properties`. Glyphs must never read sizes out of `position`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub id: String,
    pub object_type: PrimitiveType,
    pub position: Option<Position>,
    pub layer: RenderLayer,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub style: ObjectStyle,
}

impl SceneObject {
    pub fn new(id: &str, object_type: PrimitiveType, layer: RenderLayer) -> Self {
        Self {
            id: id.to_string(),
            object_type,
            position: None,
            layer,
            properties: BTreeMap::new(),
            style: ObjectStyle::default(),
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position::new(x, y));
        self
    }

    pub fn with_prop(mut self, key: &str, value: serde_json::Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    pub fn with_style(mut self, style: ObjectStyle) -> Self {
        self.style = style;
        self
    }

    pub fn prop_f64(&self, key: &str) -> Option<f64> {
        self.properties.get(key).and_then(serde_json::Value::as_f64)
    }

    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(serde_json::Value::as_str)
    }

    /// Bounding-box half extents, from properties with a fallback default.
    pub fn half_extent(&self) -> (f64, f64) {
        let w = self.prop_f64("width").unwrap_or(40.0);
        let h = self.prop_f64("height").unwrap_or(40.0);
        (w / 2.0, h / 2.0)
    }

    /// Whether this object participates in layout (annotations do not).
    pub fn needs_position(&self) -> bool {
        self.layer != RenderLayer::Annotations
    }
}

/// Free-floating annotation: labels, dimension callouts, titles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    pub text: String,
    /// Scene object this annotation labels, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

// ── Scene ──────────────────────────────────────────────────────────

/// Scene constraints reuse the plan's constraint shape, but their `entities`
/// refer to scene object ids.
pub type Constraint = LayoutConstraint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordSystem {
    pub width: f64,
    pub height: f64,
    /// Origin is the top-left corner; y grows downward (SVG convention).
    pub origin: String,
}

impl CoordSystem {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height, origin: "top-left".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub version: String,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub coord_system: CoordSystem,
    pub objects: Vec<SceneObject>,
    pub constraints: Vec<Constraint>,
    pub annotations: Vec<Annotation>,
}

impl Scene {
    pub fn new(width: f64, height: f64, domain: Domain) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("domain".to_string(), serde_json::json!(domain.as_str()));
        Self {
            version: SCENE_VERSION.to_string(),
            metadata,
            coord_system: CoordSystem::new(width, height),
            objects: Vec::new(),
            constraints: Vec::new(),
            annotations: Vec::new(),
        }
    }

    /// Minimal fallback scene used when an interpreter fails.
    pub fn fallback(width: f64, height: f64, domain: Domain) -> Self {
        let mut scene = Self::new(width, height, domain);
        scene.metadata.insert("fallback".to_string(), serde_json::json!(true));
        scene
    }

    pub fn domain(&self) -> Domain {
        self.metadata
            .get("domain")
            .and_then(serde_json::Value::as_str)
            .map_or(Domain::General, |s| match s {
                "electronics" => Domain::Electronics,
                "mechanics" => Domain::Mechanics,
                "optics" => Domain::Optics,
                "chemistry" => Domain::Chemistry,
                "geometry" => Domain::Geometry,
                _ => Domain::General,
            })
    }

    /// Add an object, rejecting duplicate ids.
    pub fn add_object(&mut self, object: SceneObject) -> Result<()> {
        if self.objects.iter().any(|o| o.id == object.id) {
            return Err(SceneError::DuplicateObject(object.id).into());
        }
        self.objects.push(object);
        Ok(())
    }

    /// Add a constraint, rejecting references to unknown object ids.
    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<()> {
        for id in &constraint.entities {
            if self.object(id).is_none() {
                return Err(SceneError::DanglingConstraint(id.clone()).into());
            }
        }
        self.constraints.push(constraint);
        Ok(())
    }

    pub fn object(&self, id: &str) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn object_mut(&mut self, id: &str) -> Option<&mut SceneObject> {
        self.objects.iter_mut().find(|o| o.id == id)
    }

    /// Validate structural invariants: unique object ids and constraint
    /// references resolving to scene objects.
    pub fn validate(&self) -> Result<()> {
        let mut ids: BTreeSet<&str> = BTreeSet::new();
        for object in &self.objects {
            if !ids.insert(object.id.as_str()) {
                return Err(SceneError::DuplicateObject(object.id.clone()).into());
            }
        }
        for constraint in &self.constraints {
            for id in &constraint.entities {
                if !ids.contains(id.as_str()) {
                    return Err(SceneError::DanglingConstraint(id.clone()).into());
                }
            }
        }
        Ok(())
    }

    /// Ids of layout-participating objects still missing a position.
    pub fn unpositioned(&self) -> Vec<&str> {
        self.objects
            .iter()
            .filter(|o| o.needs_position() && o.position.is_none())
            .map(|o| o.id.as_str())
            .collect()
    }

    /// Objects in draw order (stable within one layer).
    pub fn objects_by_layer(&self) -> Vec<&SceneObject> {
        let mut ordered: Vec<&SceneObject> = self.objects.iter().collect();
        ordered.sort_by_key(|o| o.layer);
        ordered
    }
}

// ── Tests ──────────────────────────────────────────────────────────
