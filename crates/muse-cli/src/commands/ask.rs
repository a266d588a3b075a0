//! Ask command - one chat round-trip through the engine.

use muse_assist::{AssistConfig, AssistEngine, CodeContext};

pub(crate) async fn run(message: &str, language: Option<&str>) -> miette::Result<()> {
    let config = AssistConfig::from_env();
    let engine = AssistEngine::new(config);

    let context = CodeContext {
        language: language.unwrap_or_default().to_string(),
        enclosing_symbol: None,
        imports: vec![],
    };

    let result = engine.chat(message, &context).await;
    engine.dispose().await;

    match result {
        Ok(answer) => {
            println!("{}", answer);
            Ok(())
        }
        Err(e) => Err(miette::miette!("{}", e)),
    }
}
