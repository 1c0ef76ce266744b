//! Prompt and payload construction for DashScope image / video synthesis.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const IMAGE_MODEL: &str = "wanx2.1-t2i-plus";
pub const VIDEO_MODEL: &str = "wanx2.1-i2v-plus";
pub const IMAGE_SIZE: &str = "1024*1024";
pub const VIDEO_RESOLUTION: &str = "1024*576";
pub const VIDEO_FPS: u32 = 8;

pub const DEFAULT_DURATION_SECS: u32 = 3;
pub const MIN_DURATION_SECS: u32 = 1;
pub const MAX_DURATION_SECS: u32 = 10;

/// Appearance chosen in the generator form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CatConfig {
    pub breed: String,
    pub age: String,
    pub gender: String,
}

impl CatConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.breed.trim().is_empty() || self.age.trim().is_empty() || self.gender.trim().is_empty() {
            return Err("breed, age and gender are required".to_string());
        }
        Ok(())
    }
}

pub fn breed_label(breed: &str) -> &str {
    match breed {
        "british-shorthair" => "英国短毛猫",
        "american-shorthair" => "美国短毛猫",
        "persian" => "波斯猫",
        "siamese" => "暹罗猫",
        "maine-coon" => "缅因猫",
        "ragdoll" => "布偶猫",
        other => other,
    }
}

pub fn age_label(age: &str) -> &str {
    match age {
        "kitten" => "幼猫",
        "adult" => "成年猫",
        "senior" => "老年猫",
        other => other,
    }
}

pub fn gender_label(gender: &str) -> &str {
    match gender {
        "male" => "公猫",
        "female" => "母猫",
        other => other,
    }
}

pub fn image_prompt(config: &CatConfig) -> String {
    format!(
        "一只{}的{}{}，只有一只猫咪，高清写实风格，干净背景，毛发细节丰富，自然光线，专业摄影风格，4K超高清，单只猫咪特写",
        age_label(&config.age),
        gender_label(&config.gender),
        breed_label(&config.breed),
    )
}

pub fn video_prompt(action: &str) -> String {
    format!(
        "一只可爱的猫咪正在{}，动作自然流畅，画面温馨，高清画质，背景简洁，只有一只猫咪，动作连贯，表情生动",
        action.trim()
    )
}

/// Defaults to 3 seconds and clamps into `1..=10`.
pub fn clamp_duration(requested: Option<i64>) -> u32 {
    match requested {
        None => DEFAULT_DURATION_SECS,
        Some(d) => d.clamp(MIN_DURATION_SECS as i64, MAX_DURATION_SECS as i64) as u32,
    }
}

/// Text-to-image submission body. `seed` is supplied by the caller so the
/// payload itself stays a pure function of its inputs.
pub fn image_payload(config: &CatConfig, seed: u32) -> Value {
    json!({
        "model": IMAGE_MODEL,
        "input": {
            "prompt": image_prompt(config)
        },
        "parameters": {
            "size": IMAGE_SIZE,
            "n": 1,
            "seed": seed,
            "prompt_extend": true,
            "watermark": false
        }
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSpec {
    pub image_url: String,
    pub action: String,
    pub duration: u32,
}

impl VideoSpec {
    pub fn new(image_url: &str, action: &str, duration: Option<i64>) -> Result<Self, String> {
        if image_url.trim().is_empty() || action.trim().is_empty() {
            return Err("imageUrl and prompt are required".to_string());
        }
        Ok(Self {
            image_url: image_url.trim().to_string(),
            action: action.trim().to_string(),
            duration: clamp_duration(duration),
        })
    }

    pub fn payload(&self) -> Value {
        json!({
            "model": VIDEO_MODEL,
            "input": {
                "image": self.image_url,
                "prompt": video_prompt(&self.action)
            },
            "parameters": {
                "duration": self.duration,
                "fps": VIDEO_FPS,
                "resolution": VIDEO_RESOLUTION
            }
        })
    }
}
