use codechat::app::CodechatApp;
use codechat::chat::ChatOrchestrator;
use codechat::config::AppConfig;
use codechat::logging::init_logging;
use codechat::model::OllamaModel;
use codechat::session::store::SessionStore;
use codechat::theme::Theme;
use eframe::egui;
use std::sync::Arc;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    init_logging(&config.log_filter);
    info!(
        model = %config.model,
        ollama_url = %config.ollama_url,
        sessions_dir = %config.sessions_dir.display(),
        "starting codechat"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("codechat-runtime")
        .build()?;

    let model = Arc::new(OllamaModel::new(&config.ollama_url, &config.model));
    let orchestrator = ChatOrchestrator::new(model, runtime.handle().clone());
    let store = SessionStore::new(config.sessions_dir.clone());
    let theme = Theme::default();
    let app = CodechatApp::new(store, orchestrator, theme.clone());
    let _runtime = runtime;

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Coding agent")
            .with_inner_size([1100.0, 850.0])
            .with_min_inner_size([720.0, 480.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Coding agent",
        native_options,
        Box::new(move |creation_context| {
            theme.apply_visuals(&creation_context.egui_ctx);
            Ok(Box::new(app))
        }),
    )?;

    Ok(())
}
