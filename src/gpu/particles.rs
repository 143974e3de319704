//! The two particle storage buffers.

use std::marker::PhantomData;

use wgpu::util::DeviceExt;

use super::GpuContext;
use crate::buffers::{BufferRoles, PingPong};
use crate::error::{GpuError, ResourceKind};
use crate::particle::ParticleRecord;

const SLOT_LABELS: [&str; 2] = ["Particle Buffer A", "Particle Buffer B"];

/// Ping-pong pair of equally sized particle buffers.
///
/// Both slots are usable as storage (compute), vertex (render) and copy
/// source (readback).
pub struct ParticleBuffers<P: ParticleRecord> {
    pair: PingPong<wgpu::Buffer>,
    count: u32,
    _record: PhantomData<P>,
}

impl<P: ParticleRecord> ParticleBuffers<P> {
    /// Upload `initial` into the read slot and zero the write slot.
    pub fn new(ctx: &GpuContext, initial: &[P]) -> Result<Self, GpuError> {
        let count = initial.len() as u32;
        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::VERTEX
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST;

        let first = ctx.scoped(ResourceKind::Buffer, SLOT_LABELS[0], |device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(SLOT_LABELS[0]),
                contents: bytemuck::cast_slice(initial),
                usage,
            })
        })?;
        let second = ctx.scoped(ResourceKind::Buffer, SLOT_LABELS[1], |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(SLOT_LABELS[1]),
                size: P::buffer_size(count),
                usage,
                mapped_at_creation: false,
            })
        })?;

        log::debug!(
            "Allocated 2 x {} bytes for {} {} particles",
            P::buffer_size(count),
            count,
            P::NAME
        );

        Ok(Self {
            pair: PingPong::new(first, second),
            count,
            _record: PhantomData,
        })
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn roles(&self) -> BufferRoles {
        self.pair.roles()
    }

    /// Buffer holding the latest state.
    pub fn read(&self) -> &wgpu::Buffer {
        self.pair.read()
    }

    pub fn slot(&self, index: usize) -> &wgpu::Buffer {
        self.pair.slot(index)
    }

    /// Flip roles once the step writing the write slot has been encoded.
    pub fn swap(&mut self) {
        self.pair.swap();
    }

    /// Copy the read slot back to the host.
    pub fn read_back(&self, ctx: &GpuContext) -> Result<Vec<P>, GpuError> {
        let size = P::buffer_size(self.count);
        if size == 0 {
            return Ok(Vec::new());
        }
        let staging = ctx.scoped(ResourceKind::Buffer, "Particle Readback", |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Particle Readback"),
                size,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            })
        })?;

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Particle Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(self.read(), 0, &staging, 0, size);
        ctx.queue.submit(Some(encoder.finish()));

        let bytes = ctx.map_read(&staging)?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }
}
