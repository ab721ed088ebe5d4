//! SVG renderer: layer-ordered emission with a domain theme.
//!
//! The renderer must always produce some SVG. Glyph problems degrade to
//! skipped fragments, and a scene with nothing to draw yields a labelled
//! placeholder rather than an error.

pub mod glyphs;
pub mod theme;

use tracing::debug;

use crate::scene::{RenderLayer, Scene};

pub use glyphs::escape;
pub use theme::{theme_for, Theme};

#[derive(Debug, Default)]
pub struct Renderer;

impl Renderer {
    /// Render the scene to a complete SVG document.
    pub fn render(&self, scene: &Scene) -> String {
        let theme = theme_for(scene.domain());
        let width = scene.coord_system.width;
        let height = scene.coord_system.height;

        let mut svg = String::with_capacity(4096);
        svg.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width:.0}" height="{height:.0}" viewBox="0 0 {width:.0} {height:.0}">"#,
        ));
        svg.push_str(&format!(
            r#"<rect x="0" y="0" width="{width:.0}" height="{height:.0}" fill="{}"/>"#,
            theme.background
        ));

        if scene.objects.is_empty() {
            svg.push_str(&placeholder_body(width, height, &theme));
            svg.push_str("</svg>");
            return svg;
        }

        // Draw order is the layer order; stable within a layer.
        for layer in RenderLayer::ALL {
            let fragments: Vec<String> = scene
                .objects
                .iter()
                .filter(|o| o.layer == layer)
                .map(|o| glyphs::glyph(o, scene, &theme))
                .filter(|f| !f.is_empty())
                .collect();
            if fragments.is_empty() {
                continue;
            }
            svg.push_str(&format!(r#"<g class="layer-{layer:?}">"#).to_lowercase());
            for fragment in fragments {
                svg.push_str(&fragment);
            }
            svg.push_str("</g>");
        }

        // Annotations come after the object layers.
        if !scene.annotations.is_empty() {
            svg.push_str(r#"<g class="annotations">"#);
            for annotation in &scene.annotations {
                if let Some(position) = annotation.position {
                    svg.push_str(&format!(
                        r#"<text x="{:.1}" y="{:.1}" font-family="{}" font-size="12" fill="{}">{}</text>"#,
                        position.x,
                        position.y,
                        theme.font_family,
                        theme.text,
                        escape(&annotation.text)
                    ));
                }
            }
            svg.push_str("</g>");
        }

        svg.push_str("</svg>");
        debug!(bytes = svg.len(), objects = scene.objects.len(), "scene rendered");
        svg
    }

    /// Last-resort SVG for a request whose scene never materialised.
    pub fn placeholder(&self, width: f64, height: f64, message: &str) -> String {
        let theme = theme_for(crate::types::Domain::General);
        format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width:.0}" height="{height:.0}" viewBox="0 0 {width:.0} {height:.0}"><rect x="0" y="0" width="{width:.0}" height="{height:.0}" fill="{}"/><text x="{:.1}" y="{:.1}" text-anchor="middle" font-family="{}" font-size="14" fill="{}">{}</text></svg>"#,
            theme.background,
            width / 2.0,
            height / 2.0,
            theme.font_family,
            theme.text,
            escape(message)
        )
    }
}

fn placeholder_body(width: f64, height: f64, theme: &Theme) -> String {
    format!(
        r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-family="{}" font-size="14" fill="{}">no drawable objects</text>"#,
        width / 2.0,
        height / 2.0,
        theme.font_family,
        theme.text
    )
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Annotation, PrimitiveType, SceneObject};
    use crate::types::{Domain, Position};

    #[test]
    fn empty_scene_renders_placeholder_svg() {
        let scene = Scene::new(640.0, 480.0, Domain::General);
        let svg = Renderer.render(&scene);
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("no drawable objects"));
    }

    #[test]
    fn layers_emit_in_order() {
        let mut scene = Scene::new(800.0, 600.0, Domain::General);
        scene
            .add_object(
                SceneObject::new("front", PrimitiveType::Text, RenderLayer::Foreground)
                    .at(10.0, 10.0)
                    .with_prop("text", serde_json::json!("title")),
            )
            .unwrap();
        scene
            .add_object(
                SceneObject::new("back", PrimitiveType::Rectangle, RenderLayer::Background)
                    .at(20.0, 20.0),
            )
            .unwrap();
        let svg = Renderer.render(&scene);
        let back_at = svg.find(r#"id="back""#).unwrap();
        let front_at = svg.find(r#"id="front""#).unwrap();
        assert!(back_at < front_at, "background must render before foreground");
    }

    #[test]
    fn annotations_render_after_objects() {
        let mut scene = Scene::new(800.0, 600.0, Domain::Electronics);
        scene
            .add_object(
                SceneObject::new("c1", PrimitiveType::Capacitor, RenderLayer::Shapes)
                    .at(100.0, 100.0),
            )
            .unwrap();
        scene.annotations.push(Annotation {
            id: "label_c1".into(),
            text: "C1 = 2 μF".into(),
            target: Some("c1".into()),
            position: Some(Position::new(100.0, 60.0)),
        });
        let svg = Renderer.render(&scene);
        let object_at = svg.find(r#"id="c1""#).unwrap();
        let label_at = svg.find("C1 = 2 μF").unwrap();
        assert!(object_at < label_at);
    }

    #[test]
    fn theme_follows_scene_domain() {
        let mut scene = Scene::new(800.0, 600.0, Domain::Optics);
        scene
            .add_object(
                SceneObject::new("lens", PrimitiveType::Lens, RenderLayer::Shapes).at(400.0, 300.0),
            )
            .unwrap();
        let svg = Renderer.render(&scene);
        assert!(svg.contains(theme_for(Domain::Optics).background));
    }

    #[test]
    fn placeholder_escapes_message() {
        let svg = Renderer.placeholder(400.0, 300.0, "failed: a < b");
        assert!(svg.contains("failed: a &lt; b"));
        assert!(svg.starts_with("<svg"));
    }
}
