pub mod acquire;
pub mod aliases;
pub mod artifacts;
pub mod engine;
pub mod error;
pub mod executor;
pub mod normalize;
pub mod params;
pub mod routines;
pub mod runtime;
pub mod service;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationFamily {
    Resize,
    Crop,
    ShapeCrop,
    Rotate,
    Convert,
    Watermark,
    Adjust,
    Trim,
    Extent,
    Flip,
    Flop,
    Transpose,
    Transverse,
    Filter,
    Effect,
}

impl OperationFamily {
    /// Families addressable by their bare canonical name. `filter` and `effect`
    /// are excluded: they are only reachable through a variant-carrying spelling.
    pub const BASE: [Self; 13] = [
        Self::Resize,
        Self::Crop,
        Self::ShapeCrop,
        Self::Rotate,
        Self::Convert,
        Self::Watermark,
        Self::Adjust,
        Self::Trim,
        Self::Extent,
        Self::Flip,
        Self::Flop,
        Self::Transpose,
        Self::Transverse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resize => "resize",
            Self::Crop => "crop",
            Self::ShapeCrop => "shapeCrop",
            Self::Rotate => "rotate",
            Self::Convert => "convert",
            Self::Watermark => "watermark",
            Self::Adjust => "adjust",
            Self::Trim => "trim",
            Self::Extent => "extent",
            Self::Flip => "flip",
            Self::Flop => "flop",
            Self::Transpose => "transpose",
            Self::Transverse => "transverse",
            Self::Filter => "filter",
            Self::Effect => "effect",
        }
    }

    pub fn from_base_name(name: &str) -> Option<Self> {
        Self::BASE.into_iter().find(|family| family.as_str() == name)
    }

    pub fn carries_variant(self) -> bool {
        matches!(self, Self::Filter | Self::Effect)
    }
}

impl std::fmt::Display for OperationFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
