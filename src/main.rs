pub mod app;
pub mod renderer;

use color_eyre::Result;
use app::App;
use renderer::config::RendererConfig;

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let app = App::new(RendererConfig::default());
    app.run()?;

    Ok(())
}
