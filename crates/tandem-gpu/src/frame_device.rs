//! Vulkan implementation of the frame cycle traits.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tandem_frame::{
    AcquireOutcome, FenceStatus, FrameDevice, PresentOutcome, Presenter, SubmitSync,
};

use crate::command::{begin_one_time, end_command_buffer, submit_command_buffer, CommandPool};
use crate::error::GpuError;
use crate::swapchain::Swapchain;
use crate::sync::{create_fence, create_semaphore, reset_fence, wait_for_fence};

/// Command pool with the single primary buffer one frame slot records into.
///
/// Each recorder owns its pool so rearming a slot is one pool reset.
pub struct CommandRecorder {
    pool: CommandPool,
    buffer: vk::CommandBuffer,
}

impl CommandRecorder {
    /// Command buffer to record into.
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }
}

/// Logical device and graphics queue driving the frame cycle.
pub struct VulkanFrameDevice {
    device: Arc<ash::Device>,
    queue: vk::Queue,
    queue_family: u32,
}

impl VulkanFrameDevice {
    /// Wrap a device and a queue of `queue_family`.
    pub fn new(device: Arc<ash::Device>, queue: vk::Queue, queue_family: u32) -> Self {
        Self {
            device,
            queue,
            queue_family,
        }
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }
}

fn timeout_ns(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

impl FrameDevice for VulkanFrameDevice {
    type Fence = vk::Fence;
    type Semaphore = vk::Semaphore;
    type Recorder = CommandRecorder;
    type Error = GpuError;

    fn create_fence(&mut self, signaled: bool) -> Result<vk::Fence, GpuError> {
        // SAFETY: The device is kept alive by the Arc
        unsafe { create_fence(&self.device, signaled) }
    }

    fn create_semaphore(&mut self) -> Result<vk::Semaphore, GpuError> {
        // SAFETY: The device is kept alive by the Arc
        unsafe { create_semaphore(&self.device) }
    }

    fn create_recorder(&mut self) -> Result<CommandRecorder, GpuError> {
        // SAFETY: The queue family was used to create the device
        let pool = unsafe {
            CommandPool::new(
                &self.device,
                self.queue_family,
                vk::CommandPoolCreateFlags::TRANSIENT,
            )?
        };
        // SAFETY: The pool was just created on this device
        match unsafe { pool.allocate_primary(&self.device) } {
            Ok(buffer) => Ok(CommandRecorder { pool, buffer }),
            Err(e) => {
                // SAFETY: No buffer from the pool exists
                unsafe { pool.destroy(&self.device) };
                Err(e)
            }
        }
    }

    fn wait_fence(
        &mut self,
        fence: &vk::Fence,
        timeout: Duration,
    ) -> Result<FenceStatus, GpuError> {
        // SAFETY: The fence was created by this device
        unsafe { wait_for_fence(&self.device, *fence, timeout_ns(timeout)) }
    }

    fn reset_fence(&mut self, fence: &vk::Fence) -> Result<(), GpuError> {
        // SAFETY: The frame cycle only resets fences it has seen signaled
        unsafe { reset_fence(&self.device, *fence) }
    }

    fn reset_recorder(&mut self, recorder: &mut CommandRecorder) -> Result<(), GpuError> {
        // SAFETY: The slot fence was waited on, so the buffer is not pending
        unsafe { recorder.pool.reset(&self.device) }
    }

    fn begin_recording(&mut self, recorder: &mut CommandRecorder) -> Result<(), GpuError> {
        // SAFETY: The buffer was reset and is in the initial state
        unsafe { begin_one_time(&self.device, recorder.buffer) }
    }

    fn end_recording(&mut self, recorder: &mut CommandRecorder) -> Result<(), GpuError> {
        // SAFETY: The buffer is recording
        unsafe { end_command_buffer(&self.device, recorder.buffer) }
    }

    fn submit(
        &mut self,
        recorder: &CommandRecorder,
        sync: SubmitSync<'_, Self>,
    ) -> Result<(), GpuError> {
        // SAFETY: Every handle was created by this device, and the fence is unsignaled
        unsafe {
            submit_command_buffer(
                &self.device,
                self.queue,
                recorder.buffer,
                *sync.wait_semaphore,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::TRANSFER,
                *sync.signal_semaphore,
                *sync.fence,
            )
        }
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        // SAFETY: Callers only destroy fences that are no longer in use
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        // SAFETY: Callers only destroy semaphores that are no longer in use
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn destroy_recorder(&mut self, recorder: CommandRecorder) {
        // SAFETY: Destroying the pool frees its buffer; it is no longer pending
        unsafe { recorder.pool.destroy(&self.device) };
    }
}

/// Presents through a swapchain on the graphics queue.
pub struct SwapchainPresenter<'a> {
    swapchain: &'a Swapchain,
    loader: &'a ash::khr::swapchain::Device,
    queue: vk::Queue,
}

impl<'a> SwapchainPresenter<'a> {
    pub fn new(
        swapchain: &'a Swapchain,
        loader: &'a ash::khr::swapchain::Device,
        queue: vk::Queue,
    ) -> Self {
        Self {
            swapchain,
            loader,
            queue,
        }
    }
}

impl Presenter<VulkanFrameDevice> for SwapchainPresenter<'_> {
    type Error = GpuError;

    fn acquire(
        &mut self,
        timeout: Duration,
        signal: &vk::Semaphore,
    ) -> Result<AcquireOutcome, GpuError> {
        // SAFETY: The semaphore's previous signal was consumed by the last
        // submission from the same slot, which the fence wait covered
        unsafe {
            self.swapchain
                .acquire_next_image(self.loader, *signal, timeout_ns(timeout))
        }
    }

    fn present(
        &mut self,
        image_index: u32,
        wait: &vk::Semaphore,
    ) -> Result<PresentOutcome, GpuError> {
        // SAFETY: The image index came from the matching acquire
        unsafe {
            self.swapchain
                .present(self.loader, self.queue, image_index, *wait)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GpuContextBuilder;
    use tandem_frame::FrameRing;

    #[test]
    fn timeout_saturates() {
        assert_eq!(timeout_ns(Duration::from_millis(1)), 1_000_000);
        assert_eq!(timeout_ns(Duration::MAX), u64::MAX);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn ring_primitives_on_real_device() {
        let context = GpuContextBuilder::new()
            .app_name("tandem-gpu-test")
            .validation(true)
            .build()
            .unwrap();
        let mut device = context.frame_device();
        let ring = FrameRing::new(&mut device, 2).unwrap();

        // Fresh slots must not block the first frame
        for slot in ring.slots() {
            let status = device
                .wait_fence(slot.fence(), Duration::from_millis(10))
                .unwrap();
            assert_eq!(status, FenceStatus::Signaled);
        }

        ring.destroy(&mut device, Duration::from_secs(1)).unwrap();
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn reset_fence_times_out_without_work() {
        let context = GpuContextBuilder::new().validation(true).build().unwrap();
        let mut device = context.frame_device();

        let fence = device.create_fence(true).unwrap();
        device.reset_fence(&fence).unwrap();
        let status = device.wait_fence(&fence, Duration::ZERO).unwrap();
        assert_eq!(status, FenceStatus::TimedOut);
        device.destroy_fence(fence);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn recorder_can_be_rearmed() {
        let context = GpuContextBuilder::new().validation(true).build().unwrap();
        let mut device = context.frame_device();

        let mut recorder = device.create_recorder().unwrap();
        for _ in 0..3 {
            device.reset_recorder(&mut recorder).unwrap();
            device.begin_recording(&mut recorder).unwrap();
            device.end_recording(&mut recorder).unwrap();
        }
        device.destroy_recorder(recorder);
    }
}
