use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

// ── Position ───────────────────────────────────────────────────────

/// A 2-D canvas coordinate.
///
/// Serialises as `{"x": .., "y": ..}`. Deserialisation also accepts a
/// `[x, y]` pair so scene files produced by older planners keep loading.
/// All coordinate reads in the validator and refiner go through this type;
/// nothing downstream touches raw maps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position.
    pub fn distance_to(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Midpoint between two positions.
    pub fn midpoint(&self, other: &Position) -> Position {
        Position::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    /// Translate by an offset.
    pub fn offset(&self, dx: f64, dy: f64) -> Position {
        Position::new(self.x + dx, self.y + dy)
    }

    /// Clamp into a `[0, w] × [0, h]` box.
    pub fn clamped(&self, width: f64, height: f64) -> Position {
        Position::new(self.x.clamp(0.0, width), self.y.clamp(0.0, height))
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PositionVisitor;

        impl<'de> Visitor<'de> for PositionVisitor {
            type Value = Position;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(r#"a {"x", "y"} mapping or a [x, y] pair"#)
            }

            fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<Position, A::Error> {
                let mut x = None;
                let mut y = None;
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "x" => x = Some(map.next_value::<f64>()?),
                        "y" => y = Some(map.next_value::<f64>()?),
                        _ => {
                            let _ = map.next_value::<serde::de::IgnoredAny>()?;
                        }
                    }
                }
                let x = x.ok_or_else(|| de::Error::missing_field("x"))?;
                let y = y.ok_or_else(|| de::Error::missing_field("y"))?;
                Ok(Position { x, y })
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Position, A::Error> {
                let x = seq
                    .next_element::<f64>()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let y = seq
                    .next_element::<f64>()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                Ok(Position { x, y })
            }
        }

        deserializer.deserialize_any(PositionVisitor)
    }
}

// ── Domain ─────────────────────────────────────────────────────────

/// Diagram domain, detected from the problem text or supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Electronics,
    Mechanics,
    Optics,
    Chemistry,
    Geometry,
    #[default]
    General,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electronics => "electronics",
            Self::Mechanics => "mechanics",
            Self::Optics => "optics",
            Self::Chemistry => "chemistry",
            Self::Geometry => "geometry",
            Self::General => "general",
        }
    }

    /// Detect the domain from keyword hits in the problem text.
    /// First matching bucket wins; buckets are ordered by specificity.
    pub fn detect(text: &str) -> Self {
        let lower = text.to_lowercase();
        let hits = |words: &[&str]| words.iter().filter(|w| lower.contains(*w)).count();

        let scores = [
            (
                Self::Electronics,
                hits(&[
                    "capacitor", "resistor", "circuit", "voltage", "current", "battery",
                    "charge", "potential difference", "ohm", "farad", "inductor", "dielectric",
                ]),
            ),
            (
                Self::Optics,
                hits(&["lens", "mirror", "focal", "refraction", "ray", "image distance"]),
            ),
            (
                Self::Chemistry,
                hits(&["reaction", "mole", "molecule", "atom", "acid", "equation", "reactant"]),
            ),
            (
                Self::Mechanics,
                hits(&[
                    "force", "mass", "incline", "friction", "pulley", "spring", "velocity",
                    "acceleration", "newton", "momentum", "collide",
                ]),
            ),
            (
                Self::Geometry,
                hits(&["triangle", "angle bisector", "circle inscribed", "polygon"]),
            ),
        ];

        scores
            .iter()
            .filter(|(_, n)| *n > 0)
            .max_by_key(|(_, n)| *n)
            .map_or(Self::General, |(d, _)| *d)
    }

    /// Substring dispatch used by the rule engine ("electro", "mechan", …).
    pub fn matches(&self, pattern: &str) -> bool {
        self.as_str().contains(pattern)
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Severity ───────────────────────────────────────────────────────

/// Issue severity, shared by validators and the rule engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warn,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

// ── Request id ─────────────────────────────────────────────────────

/// Unique id for one pipeline request; keys all persisted artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_accepts_mapping() {
        let p: Position = serde_json::from_str(r#"{"x": 10.0, "y": -2.5}"#).unwrap();
        assert_eq!(p, Position::new(10.0, -2.5));
    }

    #[test]
    fn position_accepts_pair() {
        let p: Position = serde_json::from_str("[10.0, -2.5]").unwrap();
        assert_eq!(p, Position::new(10.0, -2.5));
    }

    #[test]
    fn position_ignores_extra_keys() {
        let p: Position = serde_json::from_str(r#"{"x": 1.0, "y": 2.0, "z": 3.0}"#).unwrap();
        assert_eq!(p, Position::new(1.0, 2.0));
    }

    #[test]
    fn position_missing_coordinate_is_error() {
        assert!(serde_json::from_str::<Position>(r#"{"x": 1.0}"#).is_err());
        assert!(serde_json::from_str::<Position>("[1.0]").is_err());
    }

    #[test]
    fn position_geometry() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-9);
        assert_eq!(a.midpoint(&b), Position::new(1.5, 2.0));
        assert_eq!(b.clamped(2.0, 2.0), Position::new(2.0, 2.0));
    }

    #[test]
    fn domain_detection() {
        assert_eq!(
            Domain::detect("A potential difference of 300 V is applied to two capacitors"),
            Domain::Electronics
        );
        assert_eq!(
            Domain::detect("A 10 kg mass rests on a frictionless incline"),
            Domain::Mechanics
        );
        assert_eq!(
            Domain::detect("A converging lens with focal length 10 cm"),
            Domain::Optics
        );
        assert_eq!(Domain::detect("Balance the reaction 2H2 + O2 -> 2H2O"), Domain::Chemistry);
        assert_eq!(Domain::detect("Describe the weather"), Domain::General);
    }

    #[test]
    fn domain_substring_dispatch() {
        assert!(Domain::Electronics.matches("electro"));
        assert!(Domain::Mechanics.matches("mechan"));
        assert!(Domain::Optics.matches("optic"));
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::Error);
        assert!(Severity::Error > Severity::Warn);
        assert!(Severity::Warn > Severity::Info);
    }

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn position_serde_roundtrip(x in -1e6f64..1e6, y in -1e6f64..1e6) {
                let p = Position::new(x, y);
                let json = serde_json::to_string(&p).unwrap();
                let back: Position = serde_json::from_str(&json).unwrap();
                prop_assert_eq!(back, p);
            }

            #[test]
            fn position_pair_and_map_agree(x in -1e6f64..1e6, y in -1e6f64..1e6) {
                let from_map: Position =
                    serde_json::from_str(&format!(r#"{{"x": {x}, "y": {y}}}"#)).unwrap();
                let from_pair: Position =
                    serde_json::from_str(&format!("[{x}, {y}]")).unwrap();
                prop_assert_eq!(from_map, from_pair);
            }

            #[test]
            fn clamped_stays_in_bounds(x in -1e4f64..1e4, y in -1e4f64..1e4) {
                let p = Position::new(x, y).clamped(800.0, 600.0);
                prop_assert!(p.x >= 0.0 && p.x <= 800.0);
                prop_assert!(p.y >= 0.0 && p.y <= 600.0);
            }
        }
    }
}
