//! The generate → re-host sequences behind the cat flows.

use crate::dashscope::JobKind;
use crate::error::GenerationError;
use crate::generator::{GenerationJob, Generator};
use crate::prompts::{image_payload, image_prompt, CatConfig, VideoSpec};
use crate::relay::{MediaAsset, MediaKind, MediaRelay, Rehosted};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub task_id: String,
    pub prompt: String,
    /// Provider-hosted and short-lived.
    pub image_url: String,
}

fn random_seed() -> u32 {
    (Uuid::new_v4().as_u128() % 1_000_000) as u32
}

pub async fn generate_image(
    generator: &Generator,
    config: &CatConfig,
) -> Result<GeneratedImage, GenerationError> {
    config.validate().map_err(GenerationError::InvalidRequest)?;

    let mut job = GenerationJob::new(JobKind::Image, image_payload(config, random_seed()));
    let image_url = generator.run(&mut job).await?;

    Ok(GeneratedImage {
        task_id: job.task_id().unwrap_or_default().to_string(),
        prompt: image_prompt(config),
        image_url,
    })
}

/// Runs a video job. A provider-reported failure is returned as a failed job,
/// not an error; timeouts and transport problems are errors.
pub async fn generate_video(
    generator: &Generator,
    spec: &VideoSpec,
) -> Result<GenerationJob, GenerationError> {
    let mut job = GenerationJob::new(JobKind::Video, spec.payload());
    match generator.run(&mut job).await {
        Ok(_) | Err(GenerationError::ProviderFailure { .. }) => Ok(job),
        Err(e) => Err(e),
    }
}

pub fn cat_image_key(cat_id: Uuid) -> String {
    MediaKind::Image.key(&format!("cat_{}.png", cat_id))
}

pub fn video_key(cat_id: Uuid, millis: i64) -> String {
    MediaKind::Video.key(&format!("video_{}_{}.mp4", cat_id, millis))
}

/// Moves a freshly generated cat image into durable storage.
pub async fn adopt_cat_image(
    relay: &MediaRelay,
    cat_id: Uuid,
    image_url: &str,
) -> Result<Rehosted, GenerationError> {
    if image_url.trim().is_empty() {
        return Err(GenerationError::InvalidRequest("imageUrl is required".to_string()));
    }
    let mut asset = MediaAsset::new(image_url.trim());
    relay
        .persist(&mut asset, &cat_image_key(cat_id), MediaKind::Image)
        .await
}

pub struct Interaction {
    pub job: GenerationJob,
    /// Present only when the job completed.
    pub video: Option<Rehosted>,
}

/// Generates a video of the cat doing `action` and re-hosts the result.
pub async fn interact(
    generator: &Generator,
    relay: &MediaRelay,
    cat_id: Uuid,
    cat_image_url: &str,
    action: &str,
    duration: Option<i64>,
) -> Result<Interaction, GenerationError> {
    let spec = VideoSpec::new(cat_image_url, action, duration).map_err(GenerationError::InvalidRequest)?;
    let job = generate_video(generator, &spec).await?;

    let video = match job.result_url() {
        Some(url) => {
            let key = video_key(cat_id, chrono::Utc::now().timestamp_millis());
            let mut asset = MediaAsset::new(url);
            Some(relay.persist(&mut asset, &key, MediaKind::Video).await?)
        }
        None => None,
    };

    Ok(Interaction { job, video })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::JobStatus;
    use crate::relay::RehostOutcome;
    use crate::retry::{PollPolicy, SubmitPolicy};
    use crate::testing::{MemoryStore, ScriptedProvider, StaticSource};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const EPHEMERAL_IMAGE: &str =
        "https://dashscope-result-bj.oss-cn-beijing.aliyuncs.com/1d/cat.png?Expires=1720000000";
    const EPHEMERAL_VIDEO: &str =
        "https://dashscope-result-sh.oss-cn-shanghai.aliyuncs.com/v/cat.mp4?Expires=1720000000";

    fn generator(provider: Arc<ScriptedProvider>) -> Generator {
        let poll = PollPolicy {
            interval: Duration::from_millis(1),
            max_attempts: 5,
            query_timeout: Duration::from_millis(50),
        };
        Generator::new(
            provider,
            SubmitPolicy {
                max_retries: 2,
                backoff_base: Duration::from_millis(1),
            },
            poll,
            poll,
        )
    }

    #[tokio::test]
    async fn persian_adult_female_end_to_end() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![Ok("img-task".into())],
            vec![
                Ok(json!({"output": {"task_status": "RUNNING"}})),
                Ok(json!({"output": {"task_status": "SUCCEEDED", "results": [{"url": EPHEMERAL_IMAGE}]}})),
            ],
        ));
        let store = Arc::new(MemoryStore::default());
        let relay = MediaRelay::new(
            Arc::new(StaticSource::with(EPHEMERAL_IMAGE, b"\x89PNG-cat", "image/png")),
            store.clone(),
        );
        let config = CatConfig {
            breed: "persian".into(),
            age: "adult".into(),
            gender: "female".into(),
        };

        let generated = generate_image(&generator(provider.clone()), &config).await.unwrap();

        let submitted = &provider.submitted_payloads()[0];
        let prompt = submitted["input"]["prompt"].as_str().unwrap();
        for label in ["波斯猫", "成年猫", "母猫"] {
            assert!(prompt.contains(label), "{} missing from {}", label, prompt);
        }
        assert_eq!(generated.prompt, prompt);
        assert_eq!(generated.task_id, "img-task");
        assert_eq!(generated.image_url, EPHEMERAL_IMAGE);

        let cat_id = Uuid::new_v4();
        let rehosted = adopt_cat_image(&relay, cat_id, &generated.image_url).await.unwrap();

        assert_eq!(rehosted.outcome, RehostOutcome::Stored);
        assert_ne!(rehosted.url, EPHEMERAL_IMAGE);
        assert!(rehosted.url.ends_with(&cat_image_key(cat_id)));
        let (bytes, content_type) = store.get(&cat_image_key(cat_id)).unwrap();
        assert_eq!(bytes.as_ref(), b"\x89PNG-cat");
        assert_eq!(content_type, "image/png");
    }

    #[tokio::test]
    async fn invalid_config_never_reaches_provider() {
        let provider = Arc::new(ScriptedProvider::new(vec![], vec![]));
        let config = CatConfig {
            breed: "persian".into(),
            age: " ".into(),
            gender: "male".into(),
        };
        let err = generate_image(&generator(provider.clone()), &config).await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidRequest(_)));
        assert!(provider.submitted_payloads().is_empty());
    }

    #[tokio::test]
    async fn interaction_rehosts_completed_video() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![Ok("vid-task".into())],
            vec![Ok(json!({"status": "completed", "output": {"video_url": EPHEMERAL_VIDEO}}))],
        ));
        let store = Arc::new(MemoryStore::default());
        let relay = MediaRelay::new(
            Arc::new(StaticSource::with(EPHEMERAL_VIDEO, b"mp4-data", "video/mp4")),
            store.clone(),
        );
        let cat_id = Uuid::new_v4();

        let interaction = interact(
            &generator(provider.clone()),
            &relay,
            cat_id,
            "https://storage.test/cat-media/cat-images/cat.png",
            "追逐蝴蝶",
            Some(30),
        )
        .await
        .unwrap();

        assert_eq!(interaction.job.status(), JobStatus::Completed);
        let video = interaction.video.unwrap();
        assert_eq!(video.outcome, RehostOutcome::Stored);
        assert!(video.url.contains(&format!("cat-videos/video_{}_", cat_id)));
        assert_eq!(store.len(), 1);
        assert_eq!(provider.submitted_payloads()[0]["parameters"]["duration"], 10);
    }

    #[tokio::test]
    async fn failed_video_is_reported_in_band() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![Ok("vid-task".into())],
            vec![Ok(json!({"state": "FAILED", "error": "image too small"}))],
        ));
        let store = Arc::new(MemoryStore::default());
        let relay = MediaRelay::new(Arc::new(StaticSource::default()), store.clone());

        let interaction = interact(
            &generator(provider),
            &relay,
            Uuid::new_v4(),
            "https://storage.test/cat.png",
            "睡觉",
            None,
        )
        .await
        .unwrap();

        assert_eq!(interaction.job.status(), JobStatus::Failed);
        assert_eq!(interaction.job.error_message(), Some("image too small"));
        assert_eq!(interaction.job.task_id(), Some("vid-task"));
        assert!(interaction.video.is_none());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn video_timeout_is_an_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok("slow".into())], vec![]));
        let spec = VideoSpec::new("https://storage.test/cat.png", "跳跃", None).unwrap();

        let err = generate_video(&generator(provider), &spec).await.unwrap_err();
        assert!(matches!(err, GenerationError::Timeout { attempts: 5, .. }));
    }
}
