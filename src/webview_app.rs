use log::{error, info};
use tao::{
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::WindowBuilder,
};
use wry::WebViewBuilder;

/// Open a native window hosting the fretboard page at `url`.
/// Runs the tao event loop on the current thread and never returns.
/// When the window is closed, `on_close` runs before the process exits.
pub fn run<F>(url: &str, on_close: F) -> !
where
    F: FnOnce() + 'static,
{
    let event_loop = EventLoop::new();

    let window = match WindowBuilder::new()
        .with_title("Fret Monitor")
        .with_inner_size(tao::dpi::LogicalSize::new(1100_u32, 520_u32))
        .with_min_inner_size(tao::dpi::LogicalSize::new(900_u32, 400_u32))
        .build(&event_loop)
    {
        Ok(w) => w,
        Err(e) => {
            error!("Failed to create window: {}", e);
            on_close();
            std::process::exit(1);
        }
    };

    let webview = match WebViewBuilder::new().with_url(url).build(&window) {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to create WebView: {}", e);
            on_close();
            std::process::exit(1);
        }
    };

    let mut on_close = Some(on_close);
    event_loop.run(move |event, _, control_flow| {
        let _ = &webview;
        *control_flow = ControlFlow::Wait;
        if let Event::WindowEvent {
            event: WindowEvent::CloseRequested,
            ..
        } = event
        {
            info!("Window closed");
            if let Some(close) = on_close.take() {
                close();
            }
            *control_flow = ControlFlow::Exit;
        }
    })
}
