//! Viewer application implementation.

use std::sync::Arc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use tracing::{debug, info};

use tandem_app::{AppContext, FrameContext, TandemApp, VulkanFrameCycle};
use tandem_gpu::command::transition_image;
use tandem_gpu::MemoryLocation;

/// Colour at the bottom of the pulse.
const COLOR_LOW: Vec3 = Vec3::new(0.05, 0.08, 0.20);

/// Colour at the top of the pulse.
const COLOR_HIGH: Vec3 = Vec3::new(0.85, 0.35, 0.15);

/// Pulse frequency in radians per second.
const PULSE_SPEED: f32 = 1.5;

/// Data uploaded every frame.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct FrameData {
    color: [f32; 4],
    time: f32,
    frame_number: u32,
    slot_index: u32,
    _pad: u32,
}

const FRAME_DATA_SIZE: u64 = std::mem::size_of::<FrameData>() as u64;

/// Clear colour at `time` seconds.
fn pulse_color(time: f32) -> Vec3 {
    let t = (time * PULSE_SPEED).sin().mul_add(0.5, 0.5);
    COLOR_LOW.lerp(COLOR_HIGH, t)
}

/// Viewer application state.
pub struct Viewer {
    /// Seconds since start.
    time: f32,
    /// Device-local copy of the latest frame data. Released at shutdown.
    latest_frame: vk::Buffer,
}

impl TandemApp for Viewer {
    fn init(ctx: &mut AppContext, frames: &mut VulkanFrameCycle) -> anyhow::Result<Self> {
        let allocator = Arc::clone(ctx.gpu.allocator());
        let mut latest = allocator.lock().create_buffer(
            FRAME_DATA_SIZE,
            vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
            "latest frame data",
        )?;
        let latest_frame = latest.buffer;

        // Lives as long as the engine; freed once every slot has drained
        frames.schedule_global_fallible(move || allocator.lock().free_buffer(&mut latest));

        info!(
            "Viewer ready: {}x{}, {} frames in flight",
            ctx.width(),
            ctx.height(),
            frames.ring().overlap()
        );

        Ok(Self {
            time: 0.0,
            latest_frame,
        })
    }

    fn update(&mut self, _ctx: &AppContext, dt: f32) {
        self.time += dt;
    }

    fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext<'_>) -> anyhow::Result<()> {
        let device = ctx.gpu.device();
        let cmd = frame.command_buffer;
        let color = pulse_color(self.time);

        // Per-frame upload through a scratch buffer
        let data = FrameData {
            color: color.extend(1.0).to_array(),
            time: self.time,
            frame_number: u32::try_from(frame.frame_number).unwrap_or(u32::MAX),
            slot_index: u32::try_from(frame.slot_index).unwrap_or(u32::MAX),
            _pad: 0,
        };
        let allocator = Arc::clone(ctx.gpu.allocator());
        let mut scratch = allocator.lock().create_buffer(
            FRAME_DATA_SIZE,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            "frame scratch",
        )?;
        let scratch_buffer = scratch.buffer;
        let written = scratch.write(bytemuck::bytes_of(&data));
        // Handed over before anything can fail, so the buffer is never leaked
        frame.defer_fallible(move || allocator.lock().free_buffer(&mut scratch));
        written?;

        let subresource_range = vk::ImageSubresourceRange::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .base_mip_level(0)
            .level_count(1)
            .base_array_layer(0)
            .layer_count(1);
        let clear_value = vk::ClearColorValue {
            float32: data.color,
        };

        // SAFETY: The command buffer is recording. The scratch buffer lives
        // until this slot is reclaimed and the destination until shutdown,
        // both after the submission completes.
        unsafe {
            // Copies from earlier frames into the same buffer must land first
            let barriers = [vk::MemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::TRANSFER)
                .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
                .dst_stage_mask(vk::PipelineStageFlags2::TRANSFER)
                .dst_access_mask(vk::AccessFlags2::TRANSFER_WRITE)];
            let dependency = vk::DependencyInfo::default().memory_barriers(&barriers);
            device.cmd_pipeline_barrier2(cmd, &dependency);

            let region = vk::BufferCopy::default().size(FRAME_DATA_SIZE);
            device.cmd_copy_buffer(cmd, scratch_buffer, self.latest_frame, &[region]);

            transition_image(
                device,
                cmd,
                frame.swapchain_image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );
            device.cmd_clear_color_image(
                cmd,
                frame.swapchain_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &clear_value,
                &[subresource_range],
            );
            transition_image(
                device,
                cmd,
                frame.swapchain_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::PRESENT_SRC_KHR,
            );
        }

        Ok(())
    }

    fn on_resize(&mut self, _ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        debug!("Viewer resized to {width}x{height}");
        Ok(())
    }

    fn cleanup(&mut self, _ctx: &mut AppContext) {
        info!("Viewer ran for {:.1}s", self.time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_stays_between_endpoints() {
        for step in 0..100 {
            #[allow(clippy::cast_precision_loss)]
            let color = pulse_color(step as f32 * 0.1);
            let low = COLOR_LOW.min(COLOR_HIGH);
            let high = COLOR_LOW.max(COLOR_HIGH);
            assert!(color.cmpge(low - 1e-5).all());
            assert!(color.cmple(high + 1e-5).all());
        }
    }

    #[test]
    fn pulse_starts_halfway() {
        let mid = COLOR_LOW.lerp(COLOR_HIGH, 0.5);
        assert!(pulse_color(0.0).abs_diff_eq(mid, 1e-6));
    }

    #[test]
    fn frame_data_is_tightly_packed() {
        assert_eq!(FRAME_DATA_SIZE, 32);
    }
}
