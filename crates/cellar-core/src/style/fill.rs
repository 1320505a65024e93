//! Cell background fills

use super::Color;
use std::hash::{Hash, Hasher};

/// Fill of a cell background
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FillStyle {
    /// No fill (transparent)
    #[default]
    None,

    /// Pattern fill; a solid background is `PatternType::Solid` with a foreground color
    Pattern {
        pattern: PatternType,
        foreground: Color,
        background: Color,
    },

    /// Gradient fill
    Gradient {
        /// `linear` or `path`
        path: bool,
        degree: f64,
        stops: Vec<GradientStop>,
    },
}

impl FillStyle {
    /// Create a solid fill with the given color
    pub fn solid(color: Color) -> Self {
        FillStyle::Pattern {
            pattern: PatternType::Solid,
            foreground: color,
            background: Color::Auto,
        }
    }

    /// Check if this is a "no fill"
    pub fn is_none(&self) -> bool {
        matches!(self, FillStyle::None)
    }
}

impl Hash for FillStyle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            FillStyle::None => {}
            FillStyle::Pattern {
                pattern,
                foreground,
                background,
            } => {
                pattern.hash(state);
                foreground.hash(state);
                background.hash(state);
            }
            FillStyle::Gradient {
                path,
                degree,
                stops,
            } => {
                path.hash(state);
                degree.to_bits().hash(state);
                for stop in stops {
                    stop.position.to_bits().hash(state);
                    stop.color.hash(state);
                }
            }
        }
    }
}

impl Eq for FillStyle {}

/// Gradient stop (position and color)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GradientStop {
    /// Position (0.0 to 1.0)
    pub position: f64,
    pub color: Color,
}

macro_rules! pattern_types {
    ($($variant:ident => $token:literal),* $(,)?) => {
        /// Pattern fill types
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub enum PatternType {
            #[default]
            $($variant),*
        }

        impl PatternType {
            /// Value of the `patternType` attribute
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(PatternType::$variant => $token),*
                }
            }

            /// Parse a `patternType` attribute
            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($token => Some(PatternType::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

pattern_types! {
    None => "none",
    Solid => "solid",
    MediumGray => "mediumGray",
    DarkGray => "darkGray",
    LightGray => "lightGray",
    DarkHorizontal => "darkHorizontal",
    DarkVertical => "darkVertical",
    DarkDown => "darkDown",
    DarkUp => "darkUp",
    DarkGrid => "darkGrid",
    DarkTrellis => "darkTrellis",
    LightHorizontal => "lightHorizontal",
    LightVertical => "lightVertical",
    LightDown => "lightDown",
    LightUp => "lightUp",
    LightGrid => "lightGrid",
    LightTrellis => "lightTrellis",
    Gray125 => "gray125",
    Gray0625 => "gray0625",
}
