use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config;
use crate::data::{self, CommentService, FeedService};
use crate::lemmy;
use crate::logging;
use crate::session;
use crate::theme::Theme;
use crate::ui;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Instance host from the command line; overrides `lemmy.instance`.
    pub host: Option<String>,
}

pub fn run(opts: RunOptions) -> Result<()> {
    let mut cfg = config::load(config::LoadOptions::default()).context("load config")?;
    if let Some(host) = opts.host.filter(|host| !host.trim().is_empty()) {
        cfg.lemmy.instance = host;
    }

    match logging::init(&cfg.log) {
        Ok(true) => tracing::info!(version = crate::VERSION, "ltv starting"),
        Ok(false) => {}
        Err(err) => eprintln!("warning: logging disabled: {err:#}"),
    }
    if let Some(path) = config::default_path() {
        tracing::debug!(path = %path.display(), "config path");
    }

    let client = lemmy::Client::new(lemmy::ClientConfig {
        instance: cfg.lemmy.instance.clone(),
        user_agent: cfg.lemmy.user_agent.clone(),
        timeout: cfg.lemmy.timeout,
        page_size: cfg.lemmy.page_size,
        http_client: None,
    })
    .with_context(|| format!("create client for {}", cfg.lemmy.instance))?;
    let instance = client.base_url().clone();
    tracing::info!(instance = %instance, "using lemmy instance");

    let client = Arc::new(client);
    let feed_service: Arc<dyn FeedService> = Arc::new(data::LemmyFeedService::new(client.clone()));
    let comment_service: Arc<dyn CommentService> =
        Arc::new(data::LemmyCommentService::new(client));

    let options = ui::Options {
        feed_service,
        comment_service,
        session: session::Options {
            discard_stale_results: cfg.feed.discard_stale_results,
            show_fetch_errors: cfg.ui.show_fetch_errors,
        },
        theme: Theme::from_config(&cfg.ui),
        instance,
    };

    let mut model = ui::Model::new(options);
    let result = model.run();
    if let Err(err) = &result {
        tracing::error!(error = %err, "terminal session failed");
    }
    result
}
