//! Domain vocabulary: the fixed catalog of drawable terms.
//!
//! Maps surface terms to their domain and the primitive each one usually
//! renders as. Consulted by the entity tagger, the planner's drawable test,
//! and the scene interpreters. Initialised once, immutable afterwards.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::types::Domain;

/// A vocabulary entry for one drawable term.
#[derive(Debug, Clone, Copy)]
pub struct VocabEntry {
    pub domain: Domain,
    /// Primitive the term usually renders as (e.g. "battery_symbol").
    pub primitive_hint: &'static str,
}

fn build() -> BTreeMap<&'static str, VocabEntry> {
    use Domain::*;
    let entries: &[(&str, Domain, &str)] = &[
        // electronics
        ("battery", Electronics, "battery_symbol"),
        ("capacitor", Electronics, "capacitor_symbol"),
        ("resistor", Electronics, "resistor_zigzag"),
        ("inductor", Electronics, "inductor_coil"),
        ("wire", Electronics, "wire_line"),
        ("switch", Electronics, "switch_symbol"),
        ("ground", Electronics, "ground_symbol"),
        ("plate", Electronics, "capacitor_plate"),
        ("dielectric", Electronics, "dielectric_slab"),
        ("charge", Electronics, "charge_dot"),
        ("voltage source", Electronics, "battery_symbol"),
        ("power source", Electronics, "battery_symbol"),
        // mechanics
        ("mass", Mechanics, "mass_block"),
        ("block", Mechanics, "mass_block"),
        ("incline", Mechanics, "inclined_plane"),
        ("inclined plane", Mechanics, "inclined_plane"),
        ("ramp", Mechanics, "inclined_plane"),
        ("pulley", Mechanics, "pulley_wheel"),
        ("spring", Mechanics, "spring_coil"),
        ("rope", Mechanics, "rope_line"),
        ("string", Mechanics, "rope_line"),
        ("cart", Mechanics, "mass_block"),
        ("ball", Mechanics, "ball_circle"),
        ("pendulum", Mechanics, "pendulum_bob"),
        ("table", Mechanics, "surface_line"),
        ("surface", Mechanics, "surface_line"),
        // optics
        ("lens", Optics, "lens_shape"),
        ("mirror", Optics, "mirror_line"),
        ("ray", Optics, "ray_line"),
        ("object", Optics, "object_marker"),
        ("image", Optics, "image_marker"),
        ("screen", Optics, "screen_line"),
        ("prism", Optics, "prism_triangle"),
        // chemistry
        ("beaker", Chemistry, "beaker_glass"),
        ("flask", Chemistry, "beaker_glass"),
        ("molecule", Chemistry, "molecule_cluster"),
        ("atom", Chemistry, "atom_circle"),
        ("solution", Chemistry, "beaker_glass"),
        ("electrode", Chemistry, "electrode_bar"),
        // geometry
        ("triangle", Geometry, "triangle_shape"),
        ("circle", Geometry, "circle_shape"),
        ("square", Geometry, "rect_shape"),
        ("rectangle", Geometry, "rect_shape"),
        ("polygon", Geometry, "polygon_shape"),
    ];

    entries
        .iter()
        .map(|(term, domain, hint)| {
            (*term, VocabEntry { domain: *domain, primitive_hint: hint })
        })
        .collect()
}

fn table() -> &'static BTreeMap<&'static str, VocabEntry> {
    static TABLE: OnceLock<BTreeMap<&'static str, VocabEntry>> = OnceLock::new();
    TABLE.get_or_init(build)
}

/// Exact-term lookup against the normalised label.
pub fn lookup(term: &str) -> Option<&'static VocabEntry> {
    table().get(term.trim().to_lowercase().as_str())
}

/// Find the first vocabulary term contained in the label.
/// Longer terms are tried first so "inclined plane" beats "plane"/"incline".
pub fn lookup_contained(label: &str) -> Option<(&'static str, &'static VocabEntry)> {
    let lower = label.to_lowercase();
    let mut terms: Vec<_> = table().iter().collect();
    terms.sort_by_key(|(term, _)| std::cmp::Reverse(term.len()));
    terms
        .into_iter()
        .find(|(term, _)| lower.contains(*term))
        .map(|(term, entry)| (*term, entry))
}

/// All terms for one domain, for interpreters that enumerate their catalog.
pub fn terms_for(domain: Domain) -> Vec<&'static str> {
    table()
        .iter()
        .filter(|(_, e)| e.domain == domain)
        .map(|(t, _)| *t)
        .collect()
}
