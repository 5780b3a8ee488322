//! Generation request model — the configuration a caller submits.
//!
//! Validation here is the pre-admission gate: `create_task` rejects any
//! request whose `validate()` is false before it ever reaches the scheduler.

use serde::{Deserialize, Serialize};

/// Output quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderQuality {
    Hd720,
    FullHd1080,
    Uhd4k,
}

impl RenderQuality {
    /// Cost multiplier used by duration estimation.
    pub fn duration_multiplier(&self) -> f64 {
        match self {
            RenderQuality::Hd720 => 1.0,
            RenderQuality::FullHd1080 => 1.5,
            RenderQuality::Uhd4k => 3.0,
        }
    }

    /// Accelerator memory a task of this tier reserves while running.
    pub fn accel_memory_mb(&self) -> u64 {
        match self {
            RenderQuality::Uhd4k => 2048,
            _ => 1024,
        }
    }

    /// Output resolution (width, height) in landscape orientation.
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            RenderQuality::Hd720 => (1280, 720),
            RenderQuality::FullHd1080 => (1920, 1080),
            RenderQuality::Uhd4k => (3840, 2160),
        }
    }
}

/// Output aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "1:1")]
    Square,
}

/// Audio settings for the generated output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub background_track: Option<String>,
    /// Mix volume in `[0, 1]`.
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub fade_in_secs: f64,
    #[serde(default)]
    pub fade_out_secs: f64,
}

fn default_volume() -> f64 {
    0.5
}

impl AudioSettings {
    pub fn validate(&self) -> bool {
        (0.0..=1.0).contains(&self.volume) && self.fade_in_secs >= 0.0 && self.fade_out_secs >= 0.0
    }
}

/// A text overlay rendered onto the output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextOverlay {
    pub text: String,
    /// "top", "center", or "bottom".
    pub position: String,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default = "default_color")]
    pub color: String,
    /// Seconds on screen; `None` means the whole scene.
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

fn default_font_size() -> u32 {
    24
}
fn default_color() -> String {
    "#FFFFFF".into()
}

impl TextOverlay {
    pub fn validate(&self) -> bool {
        !self.text.is_empty()
            && matches!(self.position.as_str(), "top" | "center" | "bottom")
            && self.font_size > 0
            && self.duration_secs.map_or(true, |d| d > 0.0)
    }
}

/// One scene (sub-unit) of the requested output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub visual_prompt: String,
    pub duration_secs: f64,
    #[serde(default)]
    pub camera_movement: Option<String>,
    #[serde(default)]
    pub lighting: Option<String>,
    /// Asset id of a reference image, if any.
    #[serde(default)]
    pub reference_image: Option<String>,
}

impl Scene {
    pub fn validate(&self) -> bool {
        !self.id.is_empty() && !self.visual_prompt.is_empty() && self.duration_secs > 0.0
    }
}

/// Scene durations may drift from the requested total by at most this much.
pub const SCENE_DURATION_TOLERANCE_SECS: f64 = 1.0;

/// The full generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub template_id: String,
    /// Asset ids of the input media.
    pub input_assets: Vec<String>,
    /// Requested total output length in seconds.
    pub duration_secs: u32,
    pub aspect_ratio: AspectRatio,
    pub style: String,
    pub quality: RenderQuality,
    #[serde(default)]
    pub audio: Option<AudioSettings>,
    #[serde(default)]
    pub overlays: Vec<TextOverlay>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

impl RenderConfig {
    /// Pre-admission gate: structural checks plus the scene-duration
    /// consistency rule.
    pub fn validate(&self) -> bool {
        self.check().is_ok()
    }

    /// Like [`validate`](Self::validate) but with a reason on failure.
    pub fn check(&self) -> std::result::Result<(), String> {
        if self.template_id.is_empty() {
            return Err("template_id is empty".into());
        }
        if self.input_assets.is_empty() {
            return Err("no input assets".into());
        }
        if self.duration_secs == 0 {
            return Err("duration must be positive".into());
        }
        if self.style.is_empty() {
            return Err("style is empty".into());
        }
        if let Some(audio) = &self.audio {
            if !audio.validate() {
                return Err("invalid audio settings".into());
            }
        }
        for overlay in &self.overlays {
            if !overlay.validate() {
                return Err(format!("invalid overlay: {:?}", overlay.text));
            }
        }
        for scene in &self.scenes {
            if !scene.validate() {
                return Err(format!("invalid scene: {}", scene.id));
            }
        }
        if !self.scenes.is_empty() {
            let total: f64 = self.scenes.iter().map(|s| s.duration_secs).sum();
            let drift = (total - f64::from(self.duration_secs)).abs();
            if drift > SCENE_DURATION_TOLERANCE_SECS {
                return Err(format!(
                    "scene durations ({total:.1}s) don't match total duration ({}s)",
                    self.duration_secs
                ));
            }
        }
        Ok(())
    }

    /// A small valid request, handy in tests and docs.
    pub fn example() -> Self {
        Self {
            template_id: "template-product-intro".into(),
            input_assets: vec!["asset-001".into()],
            duration_secs: 10,
            aspect_ratio: AspectRatio::Landscape,
            style: "cinematic".into(),
            quality: RenderQuality::FullHd1080,
            audio: None,
            overlays: Vec::new(),
            scenes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_is_valid() {
        assert!(RenderConfig::example().validate());
    }

    #[test]
    fn test_rejects_empty_fields() {
        let mut cfg = RenderConfig::example();
        cfg.template_id.clear();
        assert!(!cfg.validate());

        let mut cfg = RenderConfig::example();
        cfg.input_assets.clear();
        assert!(!cfg.validate());

        let mut cfg = RenderConfig::example();
        cfg.duration_secs = 0;
        assert!(!cfg.validate());
    }

    #[test]
    fn test_scene_duration_tolerance() {
        let scene = |id: &str, d: f64| Scene {
            id: id.into(),
            visual_prompt: "a sweeping shot".into(),
            duration_secs: d,
            camera_movement: None,
            lighting: None,
            reference_image: None,
        };

        let mut cfg = RenderConfig::example();
        cfg.duration_secs = 10;
        cfg.scenes = vec![scene("s1", 5.0), scene("s2", 4.5)];
        // 9.5s vs 10s is within the 1s tolerance.
        assert!(cfg.validate());

        cfg.scenes = vec![scene("s1", 5.0), scene("s2", 3.0)];
        assert!(!cfg.validate());
    }

    #[test]
    fn test_audio_volume_range() {
        let mut cfg = RenderConfig::example();
        cfg.audio = Some(AudioSettings {
            enabled: true,
            background_track: None,
            volume: 1.5,
            fade_in_secs: 0.0,
            fade_out_secs: 0.0,
        });
        assert!(!cfg.validate());
    }

    #[test]
    fn test_quality_multipliers() {
        assert_eq!(RenderQuality::Hd720.duration_multiplier(), 1.0);
        assert_eq!(RenderQuality::FullHd1080.duration_multiplier(), 1.5);
        assert_eq!(RenderQuality::Uhd4k.duration_multiplier(), 3.0);
        assert_eq!(RenderQuality::Uhd4k.accel_memory_mb(), 2048);
        assert_eq!(RenderQuality::Hd720.accel_memory_mb(), 1024);
    }
}
