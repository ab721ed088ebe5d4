//! Glyph functions: one SVG fragment per primitive type.
//!
//! Every glyph reads its dimensions exclusively from `properties`; the
//! position only ever becomes the enclosing `translate`. Dimensions in the
//! position record broke rendering once; the rule is position = where,
//! properties = what.

use crate::library::{library, PrimitiveStore};
use crate::scene::{PrimitiveType, Scene, SceneObject};

use super::theme::Theme;

/// Render one object as an SVG fragment. Objects without a position render
/// as nothing (the validator will have flagged them already).
pub fn glyph(object: &SceneObject, scene: &Scene, theme: &Theme) -> String {
    let Some(position) = object.position else {
        return String::new();
    };

    // Connector lines span their endpoints rather than a local shape.
    if object.object_type == PrimitiveType::Line {
        if let Some(wire) = connector_path(object, scene, theme) {
            return wire;
        }
    }

    let body = if let Some(primitive_id) = object.prop_str("primitive_id") {
        // Retrieved library body wins over the procedural shape.
        library()
            .get(primitive_id)
            .map(|p| p.svg_content.clone())
            .unwrap_or_else(|| procedural_body(object))
    } else {
        procedural_body(object)
    };

    format!(
        r#"<g id="{}" transform="translate({:.1},{:.1})" fill="{}" stroke="{}" stroke-width="{}" opacity="{}">{}</g>"#,
        escape(&object.id),
        position.x,
        position.y,
        object.style.fill,
        object.style.stroke,
        object.style.stroke_width,
        object.style.opacity,
        body
    )
}

/// A Line object carrying `from`/`to` endpoints renders as a full-span path.
fn connector_path(object: &SceneObject, scene: &Scene, theme: &Theme) -> Option<String> {
    let from = object.prop_str("from")?;
    let to = object.prop_str("to")?;
    let a = scene.object(from)?.position?;
    let b = scene.object(to)?.position?;
    Some(format!(
        r#"<path id="{}" d="M {:.1} {:.1} L {:.1} {:.1}" fill="none" stroke="{}" stroke-width="{}"/>"#,
        escape(&object.id),
        a.x,
        a.y,
        b.x,
        b.y,
        theme.stroke,
        theme.stroke_width
    ))
}

#[allow(clippy::too_many_lines)]
fn procedural_body(object: &SceneObject) -> String {
    let w = object.prop_f64("width").unwrap_or(40.0);
    let h = object.prop_f64("height").unwrap_or(40.0);

    match object.object_type {
        PrimitiveType::Rectangle | PrimitiveType::Mass => format!(
            r#"<rect x="{:.1}" y="{:.1}" width="{w:.1}" height="{h:.1}"/>"#,
            -w / 2.0,
            -h / 2.0
        ),
        PrimitiveType::Circle | PrimitiveType::Charge => {
            let r = object.prop_f64("radius").unwrap_or(w / 2.0);
            format!(r#"<circle cx="0" cy="0" r="{r:.1}"/>"#)
        }
        PrimitiveType::Line => {
            let length = object.prop_f64("length").unwrap_or(w);
            let angle = object.prop_f64("angle_deg").unwrap_or(0.0).to_radians();
            let dx = length / 2.0 * angle.cos();
            let dy = -length / 2.0 * angle.sin();
            format!(
                r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}"/>"#,
                -dx, -dy, dx, dy
            )
        }
        PrimitiveType::Polygon => {
            let points = object.prop_str("points").unwrap_or("0,-20 20,20 -20,20");
            format!(r#"<polygon points="{}"/>"#, escape(points))
        }
        PrimitiveType::Arc => {
            let r = object.prop_f64("radius").unwrap_or(30.0);
            format!(r#"<path d="M {:.1} 0 A {r:.1} {r:.1} 0 0 1 0 {:.1}" fill="none"/>"#, -r, -r)
        }
        PrimitiveType::Arrow => {
            let length = object.prop_f64("length").unwrap_or(60.0);
            let angle = object.prop_f64("angle_deg").unwrap_or(0.0);
            // SVG y grows downward; flip so 90° points up.
            format!(
                r#"<g transform="rotate({:.1})"><line x1="0" y1="0" x2="{length:.1}" y2="0"/><path d="M {length:.1} 0 L {:.1} -5 L {:.1} 5 Z"/></g>"#,
                -angle,
                length - 10.0,
                length - 10.0
            )
        }
        PrimitiveType::Text => {
            let content = object.prop_str("text").unwrap_or("");
            format!(r#"<text x="0" y="0" text-anchor="middle">{}</text>"#, escape(content))
        }
        PrimitiveType::Battery => format!(
            r#"<line x1="0" y1="{:.1}" x2="0" y2="-8"/><line x1="{:.1}" y1="-8" x2="{:.1}" y2="-8" stroke-width="3"/><line x1="{:.1}" y1="6" x2="{:.1}" y2="6"/><line x1="0" y1="6" x2="0" y2="{:.1}"/>"#,
            -h / 2.0,
            -w / 2.0,
            w / 2.0,
            -w / 4.0,
            w / 4.0,
            h / 2.0
        ),
        PrimitiveType::Capacitor => format!(
            r#"<line x1="{:.1}" y1="0" x2="-5" y2="0"/><line x1="-5" y1="{:.1}" x2="-5" y2="{:.1}" stroke-width="3"/><line x1="5" y1="{:.1}" x2="5" y2="{:.1}" stroke-width="3"/><line x1="5" y1="0" x2="{:.1}" y2="0"/>"#,
            -w / 2.0,
            -h / 2.0,
            h / 2.0,
            -h / 2.0,
            h / 2.0,
            w / 2.0
        ),
        PrimitiveType::CapacitorPlate => format!(
            r#"<rect x="{:.1}" y="{:.1}" width="{w:.1}" height="{h:.1}"/>"#,
            -w / 2.0,
            -h / 2.0
        ),
        PrimitiveType::Resistor => format!(
            r#"<path d="M {:.1} 0 L {:.1} 0 L {:.1} -8 L {:.1} 8 L {:.1} -8 L {:.1} 8 L {:.1} 0 L {:.1} 0" fill="none"/>"#,
            -w / 2.0,
            -w / 3.0,
            -w / 6.0,
            0.0,
            w / 6.0,
            w / 4.0,
            w / 3.0,
            w / 2.0
        ),
        PrimitiveType::Switch => {
            r#"<circle cx="-12" cy="0" r="2"/><circle cx="12" cy="0" r="2"/><line x1="-12" y1="0" x2="10" y2="-10"/>"#
                .to_string()
        }
        PrimitiveType::Ground => {
            r#"<line x1="0" y1="-10" x2="0" y2="0"/><line x1="-12" y1="0" x2="12" y2="0"/><line x1="-8" y1="5" x2="8" y2="5"/><line x1="-4" y1="10" x2="4" y2="10"/>"#
                .to_string()
        }
        PrimitiveType::Spring => format!(
            r#"<path d="M {:.1} 0 L {:.1} 0 L {:.1} -8 L {:.1} 8 L {:.1} -8 L {:.1} 8 L {:.1} 0 L {:.1} 0" fill="none"/>"#,
            -w / 2.0,
            -w / 2.5,
            -w / 5.0,
            -w / 10.0,
            w / 10.0,
            w / 5.0,
            w / 2.5,
            w / 2.0
        ),
        PrimitiveType::Pulley => {
            let r = object.prop_f64("radius").unwrap_or(w / 2.0);
            format!(r#"<circle cx="0" cy="0" r="{r:.1}" fill="none"/><circle cx="0" cy="0" r="3"/>"#)
        }
        PrimitiveType::InclinedPlane => {
            let angle = object.prop_f64("angle_deg").unwrap_or(30.0).to_radians();
            let rise = w * angle.tan();
            format!(
                r#"<path d="M {:.1} {:.1} L {:.1} {:.1} L {:.1} {:.1} Z" fill-opacity="0.25"/>"#,
                -w / 2.0,
                h / 2.0,
                w / 2.0,
                h / 2.0,
                w / 2.0,
                h / 2.0 - rise
            )
        }
        PrimitiveType::Lens => format!(
            r#"<path d="M 0 {:.1} C {:.1} {:.1} {:.1} {:.1} 0 {:.1} C {:.1} {:.1} {:.1} {:.1} 0 {:.1} Z" fill-opacity="0.3"/>"#,
            -h / 2.0,
            w / 2.0,
            -h / 4.0,
            w / 2.0,
            h / 4.0,
            h / 2.0,
            -w / 2.0,
            h / 4.0,
            -w / 2.0,
            -h / 4.0,
            -h / 2.0
        ),
        PrimitiveType::Mirror => format!(
            r#"<line x1="0" y1="{:.1}" x2="0" y2="{:.1}" stroke-width="2.5"/>"#,
            -h / 2.0,
            h / 2.0
        ),
        PrimitiveType::Ray => {
            let x1 = object.prop_f64("x1");
            match (x1, object.prop_f64("y1"), object.prop_f64("x2"), object.prop_f64("y2")) {
                (Some(x1), Some(y1), Some(x2), Some(y2)) => {
                    // Ray endpoints are absolute; the glyph group is already
                    // translated to the midpoint, so re-centre.
                    let (cx, cy) = ((x1 + x2) / 2.0, (y1 + y2) / 2.0);
                    format!(
                        r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}"/><path d="M {:.1} {:.1} l -6 -3 l 2 3 l -2 3 Z"/>"#,
                        x1 - cx,
                        y1 - cy,
                        x2 - cx,
                        y2 - cy,
                        (x2 - cx) * 0.5,
                        (y2 - cy) * 0.5
                    )
                }
                _ => r#"<line x1="-40" y1="0" x2="40" y2="0"/>"#.to_string(),
            }
        }
        PrimitiveType::Beaker => format!(
            r#"<path d="M {:.1} {:.1} L {:.1} {:.1} Q {:.1} {:.1} {:.1} {:.1} L {:.1} {:.1} Q {:.1} {:.1} {:.1} {:.1} L {:.1} {:.1}" fill="none"/>"#,
            -w / 2.0,
            -h / 2.0,
            -w / 2.0,
            h / 2.0 - 7.0,
            -w / 2.0,
            h / 2.0,
            -w / 2.0 + 7.0,
            h / 2.0,
            w / 2.0 - 7.0,
            h / 2.0,
            w / 2.0,
            h / 2.0,
            w / 2.0,
            h / 2.0 - 7.0,
            w / 2.0,
            -h / 2.0
        ),
        PrimitiveType::Molecule => {
            r#"<circle cx="-10" cy="0" r="9"/><circle cx="10" cy="-7" r="7"/><circle cx="10" cy="8" r="7"/><line x1="-3" y1="-2" x2="4" y2="-6"/><line x1="-3" y1="3" x2="4" y2="7"/>"#
                .to_string()
        }
    }
}

/// Minimal XML text escaping.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ── Tests ──────────────────────────────────────────────────────────
