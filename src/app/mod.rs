use std::sync::Arc;
use std::time::Instant;

use color_eyre::eyre::eyre;
use color_eyre::{Report, Result};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use crate::renderer::config::RendererConfig;
use crate::renderer::Renderer;

/// Frames between log lines reporting the average frame rate.
const FPS_REPORT_INTERVAL: u32 = 10_000;

pub struct App {
    config: RendererConfig,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,

    frames_since_report: u32,
    last_report_time: Instant,
    close_requested: bool,
    fatal_error: Option<Report>,
}

impl App {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            frames_since_report: 0,
            last_report_time: Instant::now(),
            close_requested: false,
            fatal_error: None,
        }
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.run_app(&mut self)?;
        self.into_result()
    }

    /// Stops the event loop and carries `err` out of `run` so the process
    /// exits with a failing status and the full error report.
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: Report) {
        self.fatal_error = Some(err);
        event_loop.exit();
    }

    fn into_result(self) -> Result<()> {
        match self.fatal_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn draw(&mut self) -> Result<()> {
        let renderer = self
            .renderer
            .as_mut()
            .ok_or_else(|| eyre!("Redraw requested before the renderer exists"))?;
        renderer.draw()?;

        self.frames_since_report += 1;
        if self.frames_since_report == FPS_REPORT_INTERVAL {
            let elapsed = self.last_report_time.elapsed().as_secs_f64();
            log::debug!(
                "{:.0} fps over the last {} frames",
                f64::from(FPS_REPORT_INTERVAL) / elapsed,
                FPS_REPORT_INTERVAL,
            );
            self.frames_since_report = 0;
            self.last_report_time = Instant::now();
        }

        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let attributes = Window::default_attributes().with_title("quadra");
            match event_loop.create_window(attributes) {
                Ok(window) => self.window = Some(Arc::new(window)),
                Err(err) => {
                    self.fail(event_loop, eyre!("Failed to create window: {}", err));
                    return;
                }
            }
        }

        if self.renderer.is_none() {
            let window = self.window.as_ref().cloned();
            let renderer = window
                .ok_or_else(|| eyre!("No window to render to"))
                .and_then(|window| Renderer::new(window, &self.config));
            match renderer {
                Ok(renderer) => self.renderer = Some(renderer),
                Err(err) => self.fail(event_loop, err),
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window.as_ref().is_none_or(|window| window.id() != window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.request_resize();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.draw() {
                    self.fail(event_loop, err);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                self.close_requested = true;
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.close_requested {
            event_loop.exit();
            return;
        }

        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_shutdown_yields_ok() {
        let app = App::new(RendererConfig::default());
        assert!(app.into_result().is_ok());
    }

    #[test]
    fn stashed_fatal_error_surfaces_from_run() {
        let mut app = App::new(RendererConfig::default());
        app.fatal_error = Some(eyre!("no capable accelerator found"));
        assert!(app.into_result().is_err());
    }
}
