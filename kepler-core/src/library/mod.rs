//! Primitive library: reusable visual building blocks, retrievable by
//! semantic similarity.
//!
//! The in-memory backend ships the built-in catalog; a vector-store backend
//! can replace it behind the same trait. Search never fails: no match is a
//! normal outcome, not an error.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::embedding;
use crate::types::Domain;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Primitive {
    pub id: String,
    pub name: String,
    pub category: Domain,
    /// SVG fragment body, drawn at origin; the renderer translates it.
    pub svg_content: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// A search hit with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveMatch {
    pub primitive: Primitive,
    pub score: f32,
}

/// Backend contract for primitive retrieval.
pub trait PrimitiveStore: Send + Sync + std::fmt::Debug {
    fn semantic_search(
        &self,
        query: &str,
        limit: usize,
        domain: Option<Domain>,
    ) -> Vec<PrimitiveMatch>;

    fn get(&self, id: &str) -> Option<&Primitive>;
}

// ── In-memory backend ──────────────────────────────────────────────

#[derive(Debug)]
pub struct InMemoryLibrary {
    primitives: Vec<Primitive>,
}

impl InMemoryLibrary {
    /// Library with the built-in catalog, embeddings precomputed.
    pub fn builtin() -> Self {
        let primitives = builtin_catalog()
            .iter()
            .map(|(id, name, category, tags, svg)| {
                let tag_list: Vec<String> = tags.split(',').map(str::to_string).collect();
                let seed = format!("{name} {}", tag_list.join(" "));
                Primitive {
                    id: (*id).to_string(),
                    name: (*name).to_string(),
                    category: *category,
                    svg_content: (*svg).to_string(),
                    tags: tag_list,
                    embedding: Some(embedding::embed(&seed)),
                }
            })
            .collect();
        Self { primitives }
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}

impl PrimitiveStore for InMemoryLibrary {
    fn semantic_search(
        &self,
        query: &str,
        limit: usize,
        domain: Option<Domain>,
    ) -> Vec<PrimitiveMatch> {
        let query_vec = embedding::embed(query);
        let query_has_signal = query_vec.iter().any(|x| *x != 0.0);

        let mut matches: Vec<PrimitiveMatch> = self
            .primitives
            .iter()
            .filter(|p| domain.is_none_or(|d| p.category == d))
            .filter_map(|p| {
                let score = if query_has_signal {
                    p.embedding
                        .as_deref()
                        .map(|e| embedding::cosine(&query_vec, e))
                        .unwrap_or_else(|| tag_overlap(query, &p.tags))
                } else {
                    tag_overlap(query, &p.tags)
                };
                (score > 0.0).then(|| PrimitiveMatch { primitive: p.clone(), score })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.primitive.id.cmp(&b.primitive.id))
        });
        matches.truncate(limit);
        matches
    }

    fn get(&self, id: &str) -> Option<&Primitive> {
        self.primitives.iter().find(|p| p.id == id)
    }
}

/// Tag-intersection fallback, ranked by overlap size over query token count.
#[allow(clippy::cast_precision_loss)]
fn tag_overlap(query: &str, tags: &[String]) -> f32 {
    let tokens: Vec<String> = query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let overlap = tokens.iter().filter(|t| tags.iter().any(|tag| tag == *t)).count();
    overlap as f32 / tokens.len() as f32
}

/// Process-wide library instance, initialised lazily, immutable after init.
pub fn library() -> &'static InMemoryLibrary {
    static INSTANCE: OnceLock<InMemoryLibrary> = OnceLock::new();
    INSTANCE.get_or_init(InMemoryLibrary::builtin)
}

// ── Built-in catalog ───────────────────────────────────────────────

type CatalogEntry = (&'static str, &'static str, Domain, &'static str, &'static str);

#[allow(clippy::too_many_lines)]
fn builtin_catalog() -> &'static [CatalogEntry] {
    use Domain::*;
    &[
        (
            "battery_symbol",
            "battery",
            Electronics,
            "battery,voltage,source,power,cell",
            r#"<g><line x1="0" y1="-20" x2="0" y2="-6" stroke-width="1.5"/><line x1="-14" y1="-6" x2="14" y2="-6" stroke-width="2.5"/><line x1="-7" y1="4" x2="7" y2="4" stroke-width="1.5"/><line x1="0" y1="4" x2="0" y2="20" stroke-width="1.5"/></g>"#,
        ),
        (
            "capacitor_symbol",
            "capacitor",
            Electronics,
            "capacitor,plate,charge,farad,dielectric",
            r#"<g><line x1="-20" y1="0" x2="-4" y2="0"/><line x1="-4" y1="-14" x2="-4" y2="14" stroke-width="2.5"/><line x1="4" y1="-14" x2="4" y2="14" stroke-width="2.5"/><line x1="4" y1="0" x2="20" y2="0"/></g>"#,
        ),
        (
            "capacitor_plate",
            "capacitor plate",
            Electronics,
            "plate,capacitor,conductor",
            r#"<rect x="-30" y="-3" width="60" height="6"/>"#,
        ),
        (
            "dielectric_slab",
            "dielectric slab",
            Electronics,
            "dielectric,insulator,slab,kappa",
            r#"<rect x="-28" y="-10" width="56" height="20" fill-opacity="0.35"/>"#,
        ),
        (
            "resistor_zigzag",
            "resistor",
            Electronics,
            "resistor,resistance,ohm,zigzag",
            r#"<path d="M -24 0 L -16 0 L -12 -8 L -4 8 L 4 -8 L 12 8 L 16 0 L 24 0" fill="none"/>"#,
        ),
        (
            "switch_symbol",
            "switch",
            Electronics,
            "switch,open,closed,contact",
            r#"<g><circle cx="-12" cy="0" r="2"/><circle cx="12" cy="0" r="2"/><line x1="-12" y1="0" x2="10" y2="-10"/></g>"#,
        ),
        (
            "ground_symbol",
            "ground",
            Electronics,
            "ground,earth,reference",
            r#"<g><line x1="0" y1="-10" x2="0" y2="0"/><line x1="-12" y1="0" x2="12" y2="0"/><line x1="-8" y1="5" x2="8" y2="5"/><line x1="-4" y1="10" x2="4" y2="10"/></g>"#,
        ),
        (
            "charge_dot",
            "point charge",
            Electronics,
            "charge,point,coulomb,electron",
            r#"<g><circle cx="0" cy="0" r="6"/><line x1="-3" y1="0" x2="3" y2="0"/><line x1="0" y1="-3" x2="0" y2="3"/></g>"#,
        ),
        (
            "mass_block",
            "mass block",
            Mechanics,
            "mass,block,weight,body,box",
            r#"<rect x="-25" y="-25" width="50" height="50"/>"#,
        ),
        (
            "inclined_plane",
            "inclined plane",
            Mechanics,
            "incline,ramp,slope,plane,wedge",
            r#"<path d="M -100 50 L 100 50 L 100 -50 Z" fill-opacity="0.2"/>"#,
        ),
        (
            "pulley_wheel",
            "pulley",
            Mechanics,
            "pulley,wheel,rope,tackle",
            r#"<g><circle cx="0" cy="0" r="18" fill="none"/><circle cx="0" cy="0" r="3"/></g>"#,
        ),
        (
            "spring_coil",
            "spring",
            Mechanics,
            "spring,coil,hooke,elastic",
            r#"<path d="M -30 0 L -22 0 L -18 -8 L -10 8 L -2 -8 L 6 8 L 14 -8 L 18 0 L 30 0" fill="none"/>"#,
        ),
        (
            "force_arrow",
            "force arrow",
            Mechanics,
            "force,arrow,vector,newton",
            r#"<g><line x1="0" y1="0" x2="40" y2="0" stroke-width="2.5"/><path d="M 40 0 L 32 -5 L 32 5 Z"/></g>"#,
        ),
        (
            "pendulum_bob",
            "pendulum",
            Mechanics,
            "pendulum,bob,swing,oscillation",
            r#"<g><line x1="0" y1="-40" x2="0" y2="0"/><circle cx="0" cy="8" r="8"/></g>"#,
        ),
        (
            "lens_shape",
            "converging lens",
            Optics,
            "lens,converging,focal,refraction,optics",
            r#"<path d="M 0 -55 C 14 -28 14 28 0 55 C -14 28 -14 -28 0 -55 Z" fill-opacity="0.25"/>"#,
        ),
        (
            "mirror_line",
            "mirror",
            Optics,
            "mirror,reflection,plane",
            r#"<g><line x1="0" y1="-50" x2="0" y2="50" stroke-width="2.5"/><line x1="0" y1="-40" x2="6" y2="-46"/><line x1="0" y1="-20" x2="6" y2="-26"/><line x1="0" y1="0" x2="6" y2="-6"/><line x1="0" y1="20" x2="6" y2="14"/><line x1="0" y1="40" x2="6" y2="34"/></g>"#,
        ),
        (
            "ray_line",
            "light ray",
            Optics,
            "ray,light,beam,path",
            r#"<g><line x1="-50" y1="0" x2="50" y2="0" stroke-dasharray="none"/><path d="M 10 0 L 2 -4 L 2 4 Z"/></g>"#,
        ),
        (
            "beaker_glass",
            "beaker",
            Chemistry,
            "beaker,flask,glass,solution,liquid",
            r#"<path d="M -20 -30 L -20 25 Q -20 32 -13 32 L 13 32 Q 20 32 20 25 L 20 -30" fill="none"/>"#,
        ),
        (
            "molecule_cluster",
            "molecule",
            Chemistry,
            "molecule,atom,bond,compound,formula",
            r#"<g><circle cx="-10" cy="0" r="8"/><circle cx="10" cy="-6" r="6"/><circle cx="10" cy="8" r="6"/><line x1="-4" y1="-2" x2="5" y2="-5"/><line x1="-4" y1="3" x2="5" y2="7"/></g>"#,
        ),
        (
            "triangle_shape",
            "triangle",
            Geometry,
            "triangle,three,sides,angles",
            r#"<path d="M 0 -30 L 35 25 L -35 25 Z" fill="none"/>"#,
        ),
    ]
}

// ── Tests ──────────────────────────────────────────────────────────
