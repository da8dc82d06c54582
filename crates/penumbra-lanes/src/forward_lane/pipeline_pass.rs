// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A render pipeline plus the state changes recorded around it.

use penumbra_core::renderer::{
    GraphicsDevice, PrimitiveTopology, RenderPass, RenderPipelineDescriptor, RenderPipelineId,
    ResourceError, ShaderStages,
};
use std::fmt;

/// Records extra state into the pass before or after a pipeline draws.
pub type PassHook = Box<dyn Fn(&mut dyn RenderPass<'_>) + Send + Sync>;

/// A pipeline together with optional begin and end hooks.
///
/// Composition passes share pipeline passes through `Arc`; the forward
/// renderer binds the pipeline and runs the hooks around its draws.
pub struct PipelinePass {
    name: String,
    pipeline: RenderPipelineId,
    shader_stages: Option<ShaderStages>,
    topology: PrimitiveTopology,
    begin: Option<PassHook>,
    end: Option<PassHook>,
}

impl PipelinePass {
    /// Creates the pipeline described by `descriptor`.
    pub fn new(
        device: &dyn GraphicsDevice,
        descriptor: &RenderPipelineDescriptor<'_>,
    ) -> Result<Self, ResourceError> {
        let pipeline = device.create_render_pipeline(descriptor)?;
        let name = descriptor
            .label
            .as_deref()
            .unwrap_or("unnamed pipeline")
            .to_string();
        log::trace!("PipelinePass({}): created pipeline {:?}", name, pipeline);
        Ok(Self {
            name,
            pipeline,
            shader_stages: descriptor.shader_stages.clone(),
            topology: descriptor.topology,
            begin: None,
            end: None,
        })
    }

    /// Runs `hook` before the pass draws.
    pub fn with_begin(mut self, hook: impl Fn(&mut dyn RenderPass<'_>) + Send + Sync + 'static) -> Self {
        self.begin = Some(Box::new(hook));
        self
    }

    /// Runs `hook` after the pass draws.
    pub fn with_end(mut self, hook: impl Fn(&mut dyn RenderPass<'_>) + Send + Sync + 'static) -> Self {
        self.end = Some(Box::new(hook));
        self
    }

    /// Debug name, taken from the pipeline label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The device pipeline.
    pub fn pipeline(&self) -> RenderPipelineId {
        self.pipeline
    }

    /// The pipeline's own program, if it has one.
    pub fn shader_stages(&self) -> Option<&ShaderStages> {
        self.shader_stages.as_ref()
    }

    /// Primitive topology of the pipeline.
    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    pub(crate) fn run_begin(&self, pass: &mut dyn RenderPass<'_>) {
        if let Some(hook) = &self.begin {
            hook(pass);
        }
    }

    pub(crate) fn run_end(&self, pass: &mut dyn RenderPass<'_>) {
        if let Some(hook) = &self.end {
            hook(pass);
        }
    }

    /// Releases the device pipeline.
    pub fn destroy(&self, device: &dyn GraphicsDevice) {
        if let Err(e) = device.destroy_render_pipeline(self.pipeline) {
            log::warn!("PipelinePass({}): Failed to destroy pipeline: {:?}", self.name, e);
        }
    }
}

impl fmt::Debug for PipelinePass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelinePass")
            .field("name", &self.name)
            .field("pipeline", &self.pipeline)
            .field("shader_stages", &self.shader_stages.as_ref().map(|s| &s.name))
            .field("topology", &self.topology)
            .field("begin", &self.begin.is_some())
            .field("end", &self.end.is_some())
            .finish()
    }
}
