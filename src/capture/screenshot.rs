//! Desktop mirroring host backed by the `xcap` crate.
//!
//! This is the infrastructure layer that talks to the OS. A desktop has no
//! mirroring permission dialog, so `AutoGrantBroker` answers every prompt
//! with a grant. A "mirroring session" here is a single primary-monitor grab
//! on the blocking pool, delivered through the sink like any other host.

use crate::capture::frame::FrameBuffer;
use crate::capture::host::{
    DisplayMetrics, HostError, HostEventSink, MirrorTarget, MirroringHost, MirroringSession,
    PermissionBroker, PermissionReply, PermissionToken,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use xcap::Monitor;

/// DPI a monitor reports at scale factor 1.0.
const BASE_DPI: f32 = 96.0;

const DESKTOP_TOKEN: &str = "desktop";

/// Finds the primary monitor, falling back to the first one listed.
fn primary_monitor() -> Result<Monitor, HostError> {
    let monitors =
        Monitor::all().map_err(|e| HostError::DisplayUnavailable(e.to_string()))?;

    let mut fallback = None;
    for monitor in monitors {
        if monitor.is_primary().unwrap_or(false) {
            return Ok(monitor);
        }
        if fallback.is_none() {
            fallback = Some(monitor);
        }
    }
    fallback.ok_or_else(|| HostError::DisplayUnavailable("No monitor found".into()))
}

/// Size of a capture in pixels. macOS reports monitors in points.
#[cfg(target_os = "macos")]
fn physical_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
    (
        (width as f32 * scale).round() as u32,
        (height as f32 * scale).round() as u32,
    )
}

#[cfg(not(target_os = "macos"))]
fn physical_size(width: u32, height: u32, _scale: f32) -> (u32, u32) {
    (width, height)
}

/// Grants every prompt immediately.
pub struct AutoGrantBroker;

impl PermissionBroker for AutoGrantBroker {
    fn request(&self, reply: PermissionReply) {
        log::info!("[CAPTURE] Desktop host: granting mirroring without a prompt");
        reply.grant(PermissionToken(DESKTOP_TOKEN.to_string()));
    }
}

/// Primary-monitor capture via xcap.
pub struct XcapHost;

impl MirroringHost for XcapHost {
    fn display_metrics(&self) -> Result<DisplayMetrics, HostError> {
        let monitor = primary_monitor()?;
        let width = monitor
            .width()
            .map_err(|e| HostError::DisplayUnavailable(e.to_string()))?;
        let height = monitor
            .height()
            .map_err(|e| HostError::DisplayUnavailable(e.to_string()))?;
        let scale = monitor.scale_factor().unwrap_or(1.0);
        let (width, height) = physical_size(width, height, scale);
        Ok(DisplayMetrics {
            width,
            height,
            density_dpi: (BASE_DPI * scale).round() as u32,
        })
    }

    fn start_mirroring(
        &self,
        token: &PermissionToken,
        target: &MirrorTarget,
        sink: HostEventSink,
    ) -> Result<Box<dyn MirroringSession>, HostError> {
        if token.0 != DESKTOP_TOKEN {
            return Err(HostError::Revoked(format!("unknown token {:?}", token.0)));
        }
        let monitor = primary_monitor()?;
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let target = *target;

        tokio::task::spawn_blocking(move || {
            let start = std::time::Instant::now();
            let image = match monitor.capture_image() {
                Ok(image) => image,
                Err(e) => {
                    sink.terminated(format!("Screen capture failed: {}", e));
                    return;
                }
            };
            if flag.load(Ordering::SeqCst) {
                return;
            }
            log::info!(
                "[LATENCY] xcap_capture={:.2}ms ({}x{}, target {}x{})",
                start.elapsed().as_micros() as f64 / 1000.0,
                image.width(),
                image.height(),
                target.width,
                target.height
            );
            let (width, height) = image.dimensions();
            sink.frame_ready(FrameBuffer::packed_rgba(width, height, image.into_raw()));
        });

        Ok(Box::new(XcapSession { released }))
    }
}

struct XcapSession {
    released: Arc<AtomicBool>,
}

impl MirroringSession for XcapSession {
    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

impl Drop for XcapSession {
    fn drop(&mut self) {
        self.release();
    }
}
