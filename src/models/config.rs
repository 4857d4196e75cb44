use crate::assets::AssetLoader;
use crate::cache::CacheBudget;
use crate::color::ColorModel;
use crate::order::Packing;
use serde::Deserialize;
use std::collections::HashMap;

/// Halftone configuration loaded from halftone.yaml
#[derive(Debug, Deserialize, Clone)]
pub struct HalftoneConfig {
    /// Device color model
    #[serde(default)]
    pub color_model: ColorModelConfig,

    /// Tile cache limits for installed orders
    #[serde(default)]
    pub cache: CacheBudget,

    /// Largest full-tile bitmap (bytes) a screen order may use before it
    /// falls back to a shifted strip
    #[serde(default = "default_max_order_bytes")]
    pub max_order_bytes: usize,

    /// Screen definitions
    #[serde(default)]
    pub screens: HashMap<String, ScreenConfig>,

    /// Screen used for every component without an explicit one
    #[serde(default = "default_screen")]
    pub default_screen: Option<String>,

    /// Per-component screen names, by component index
    #[serde(default)]
    pub component_screens: Vec<String>,
}

fn default_screen() -> Option<String> {
    Some("default".to_string())
}

fn default_max_order_bytes() -> usize {
    64 * 1024
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorKind {
    #[default]
    Gray,
    Rgb,
    Cmyk,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ColorModelConfig {
    #[serde(default)]
    pub kind: ColorKind,

    /// Device levels per component (2 for bilevel)
    #[serde(default = "default_levels")]
    pub levels: u32,
}

fn default_levels() -> u32 {
    2
}

impl Default for ColorModelConfig {
    fn default() -> Self {
        Self {
            kind: ColorKind::Gray,
            levels: default_levels(),
        }
    }
}

impl ColorModelConfig {
    pub fn model(&self) -> ColorModel {
        match self.kind {
            ColorKind::Gray => ColorModel::gray(self.levels),
            ColorKind::Rgb => ColorModel::rgb(self.levels),
            ColorKind::Cmyk => ColorModel::cmyk(self.levels),
        }
    }
}

/// Configuration for one screen: either a spot-function screen or a
/// built-in resident pattern
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ScreenConfig {
    /// Lines per inch
    #[serde(default = "default_frequency")]
    pub frequency: f64,

    /// Screen angle in degrees
    #[serde(default = "default_angle")]
    pub angle: f64,

    /// Device resolution in dots per inch
    #[serde(default = "default_resolution")]
    pub resolution: f64,

    /// Spot function name (round, euclidean, ellipse, line, diamond, square, cross)
    #[serde(default = "default_spot")]
    pub spot: String,

    /// Search for a cell that hits the requested angle closely
    #[serde(default)]
    pub accurate: bool,

    /// Bit record packing
    #[serde(default)]
    pub packing: Packing,

    /// Optional gamma transfer function
    #[serde(default)]
    pub gamma: Option<f64>,

    /// Use a resident pattern (e.g. "bayer8") instead of a spot screen
    #[serde(default)]
    pub resident: Option<String>,
}

fn default_frequency() -> f64 {
    75.0
}

fn default_angle() -> f64 {
    45.0
}

fn default_resolution() -> f64 {
    600.0
}

fn default_spot() -> String {
    "round".to_string()
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            frequency: default_frequency(),
            angle: default_angle(),
            resolution: default_resolution(),
            spot: default_spot(),
            accurate: false,
            packing: Packing::default(),
            gamma: None,
            resident: None,
        }
    }
}

impl HalftoneConfig {
    /// Load configuration from AssetLoader (embedded or external)
    pub fn load_from_assets(loader: &AssetLoader) -> Self {
        match loader.read_config_string() {
            Ok(content) => match serde_yaml::from_str(&content) {
                Ok(config) => {
                    let config: Self = config;
                    tracing::info!(
                        screens = config.screens.len(),
                        components = config.component_screens.len(),
                        "Loaded configuration"
                    );
                    config
                }
                Err(e) => {
                    tracing::warn!(%e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(%e, "Failed to read config, using defaults");
                Self::default()
            }
        }
    }

    /// Get a screen by name
    pub fn get_screen(&self, name: &str) -> Option<&ScreenConfig> {
        self.screens.get(name)
    }

    /// Get the default screen config
    pub fn get_default_screen(&self) -> Option<&ScreenConfig> {
        self.default_screen
            .as_ref()
            .and_then(|name| self.screens.get(name))
    }
}

impl Default for HalftoneConfig {
    fn default() -> Self {
        let mut screens = HashMap::new();
        screens.insert("default".to_string(), ScreenConfig::default());

        Self {
            color_model: ColorModelConfig::default(),
            cache: CacheBudget::default(),
            max_order_bytes: default_max_order_bytes(),
            screens,
            default_screen: default_screen(),
            component_screens: Vec::new(),
        }
    }
}
