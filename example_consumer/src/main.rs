//! Blog backend generated from `./models`.
//!
//! Run from repo root: `MODELS_DIR=example_consumer/models JWT_SECRET=dev cargo run -p example-consumer`
//! Without `DATABASE_URL` records live in memory.

use crudforge::{
    apply_migrations, load_from_dir, reconcile, resolve, AppBuilder, ConfirmPolicy, HookRegistry, PgEngine,
    Settings, StageOutcome,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("crudforge=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let models = load_from_dir(&settings.models_dir).await?;
    let model = resolve(&models)?;

    // posts are owned by whoever creates them
    let hooks = HookRegistry::new().on("post", "beforeCreateOne", |ctx| {
        if let (Some(identity), Value::Object(body)) = (&ctx.identity, &mut ctx.body) {
            body.insert("authorId".into(), identity.id.clone());
        }
        Ok(StageOutcome::Continue)
    })?;

    let mut builder = AppBuilder::new(settings.clone(), model).hooks(hooks);
    if let Some(url) = &settings.database_url {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        apply_migrations(&pool, &builder.model()).await?;
        let engine = PgEngine::new(pool, builder.model(), builder.catalog());
        builder = builder.with_engine(Arc::new(engine));
    }
    let app = builder.build()?;

    let snapshot = settings.models_dir.join(".permissions.json");
    let warnings = reconcile(&snapshot, &app.state.permissions, ConfirmPolicy::from_settings(&settings)).await?;
    if !warnings.is_empty() {
        tracing::info!(changes = warnings.len(), "permission changes approved");
    }

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app.router).await?;
    Ok(())
}
