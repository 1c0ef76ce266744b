use crate::entities::{cat, user, video_interaction};
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};

/// Seeds the totals gauges from the database so they survive restarts.
pub async fn init_metrics(db: &DatabaseConnection) {
    let user_count = user::Entity::find().count(db).await.unwrap_or(0);
    metrics::gauge!("catkeeper_users_total").set(user_count as f64);

    let cat_count = cat::Entity::find().count(db).await.unwrap_or(0);
    metrics::gauge!("catkeeper_cats_total").set(cat_count as f64);

    let video_count = video_interaction::Entity::find().count(db).await.unwrap_or(0);
    metrics::gauge!("catkeeper_videos_total").set(video_count as f64);

    tracing::info!(
        "Initialized metrics: Users={}, Cats={}, Videos={}",
        user_count,
        cat_count,
        video_count
    );
}

pub fn increment_users_registered() {
    metrics::counter!("catkeeper_users_registered_total").increment(1);
    metrics::gauge!("catkeeper_users_total").increment(1.0);
}

/// Breed as a metric label. Free-form breeds collapse into "other".
pub fn breed_metric_label(breed: &str) -> &str {
    if crate::prompts::breed_label(breed) != breed {
        breed
    } else {
        "other"
    }
}

pub fn increment_cats_adopted(breed: &str) {
    metrics::counter!("catkeeper_cats_adopted_total", "breed" => breed_metric_label(breed).to_string())
        .increment(1);
    metrics::gauge!("catkeeper_cats_total").increment(1.0);
}

pub fn decrement_cats() {
    metrics::gauge!("catkeeper_cats_total").decrement(1.0);
}

pub fn increment_videos_recorded() {
    metrics::counter!("catkeeper_videos_recorded_total").increment(1);
    metrics::gauge!("catkeeper_videos_total").increment(1.0);
}

/// Interactions removed along with their cat.
pub fn decrement_videos(count: u64) {
    if count > 0 {
        metrics::gauge!("catkeeper_videos_total").decrement(count as f64);
    }
}
