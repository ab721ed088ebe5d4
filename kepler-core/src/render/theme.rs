//! Domain themes: palette and stroke defaults resolved from the scene domain.

use crate::types::Domain;

#[derive(Debug, Clone)]
pub struct Theme {
    pub background: &'static str,
    pub stroke: &'static str,
    pub fill: &'static str,
    pub accent: &'static str,
    pub text: &'static str,
    pub font_family: &'static str,
    pub stroke_width: f64,
}

pub fn theme_for(domain: Domain) -> Theme {
    match domain {
        Domain::Electronics => Theme {
            background: "#fbfdff",
            stroke: "#1f3a5f",
            fill: "#eef3f8",
            accent: "#c0392b",
            text: "#17263b",
            font_family: "Helvetica, Arial, sans-serif",
            stroke_width: 1.8,
        },
        Domain::Mechanics => Theme {
            background: "#fffdf9",
            stroke: "#5a4632",
            fill: "#f5efe6",
            accent: "#b03a2e",
            text: "#3b2f22",
            font_family: "Helvetica, Arial, sans-serif",
            stroke_width: 1.8,
        },
        Domain::Optics => Theme {
            background: "#f9fffc",
            stroke: "#1d6b4f",
            fill: "#eefaf5",
            accent: "#8e44ad",
            text: "#123f30",
            font_family: "Helvetica, Arial, sans-serif",
            stroke_width: 1.6,
        },
        Domain::Chemistry => Theme {
            background: "#fffafd",
            stroke: "#6b1d55",
            fill: "#f8eef6",
            accent: "#1d6b4f",
            text: "#401234",
            font_family: "Helvetica, Arial, sans-serif",
            stroke_width: 1.6,
        },
        Domain::Geometry | Domain::General => Theme {
            background: "#ffffff",
            stroke: "#333333",
            fill: "#f2f2f2",
            accent: "#2e86c1",
            text: "#222222",
            font_family: "Helvetica, Arial, sans-serif",
            stroke_width: 1.5,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_domain_has_a_theme() {
        for domain in [
            Domain::Electronics,
            Domain::Mechanics,
            Domain::Optics,
            Domain::Chemistry,
            Domain::Geometry,
            Domain::General,
        ] {
            let theme = theme_for(domain);
            assert!(theme.stroke.starts_with('#'));
            assert!(theme.stroke_width > 0.0);
        }
    }

    #[test]
    fn domains_are_visually_distinct() {
        assert_ne!(theme_for(Domain::Electronics).stroke, theme_for(Domain::Chemistry).stroke);
        assert_ne!(theme_for(Domain::Mechanics).stroke, theme_for(Domain::Optics).stroke);
    }
}
