//! Bakeable PBR channels

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::task::{BakeType, NativePass};

/// Channels that need a dedicated texture input binding on the asset server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialChannel {
    Height,
    Emission,
    Anisotropy,
    Transmission,
    Subsurface,
}

impl SpecialChannel {
    /// Shader input the baked texture is bound to server-side
    pub fn server_input(&self) -> &'static str {
        match self {
            SpecialChannel::Height => "height",
            SpecialChannel::Emission => "emissive",
            SpecialChannel::Anisotropy => "anisotropy",
            SpecialChannel::Transmission => "transmittance",
            SpecialChannel::Subsurface => "subsurface",
        }
    }
}

impl fmt::Display for SpecialChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.server_input())
    }
}

/// Static description of one bakeable channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSpec {
    /// Socket name on the main shader (or the output node)
    pub socket: &'static str,
    /// Scalar signal rather than a color
    pub is_value: bool,
    /// Color data (sRGB) rather than non-color data
    pub is_color_data: bool,
    pub bake_type: BakeType,
    pub special: Option<SpecialChannel>,
    /// Lives on the material output node instead of the main shader
    pub on_output: bool,
}

const fn value(socket: &'static str, special: Option<SpecialChannel>) -> ChannelSpec {
    ChannelSpec {
        socket,
        is_value: true,
        is_color_data: false,
        bake_type: BakeType::Emit,
        special,
        on_output: false,
    }
}

pub const PBR_CHANNELS: &[ChannelSpec] = &[
    ChannelSpec {
        socket: "Base Color",
        is_value: false,
        is_color_data: true,
        bake_type: BakeType::Emit,
        special: None,
        on_output: false,
    },
    value("Metallic", None),
    value("Roughness", None),
    ChannelSpec {
        socket: "Normal",
        is_value: false,
        is_color_data: false,
        bake_type: BakeType::Native(NativePass::Normal),
        special: None,
        on_output: false,
    },
    value("Alpha", None),
    ChannelSpec {
        socket: "Emission Color",
        is_value: false,
        is_color_data: true,
        bake_type: BakeType::Emit,
        special: Some(SpecialChannel::Emission),
        on_output: false,
    },
    value("Emission Strength", None),
    value("Specular IOR Level", None),
    value("Anisotropic", Some(SpecialChannel::Anisotropy)),
    value("Transmission Weight", Some(SpecialChannel::Transmission)),
    value("Subsurface Weight", Some(SpecialChannel::Subsurface)),
    value("Coat Weight", None),
    value("Sheen Weight", None),
    ChannelSpec {
        socket: "Displacement",
        is_value: true,
        is_color_data: false,
        bake_type: BakeType::Emit,
        special: Some(SpecialChannel::Height),
        on_output: true,
    },
];

pub fn channel_spec(socket: &str) -> Option<&'static ChannelSpec> {
    PBR_CHANNELS.iter().find(|c| c.socket == socket)
}
