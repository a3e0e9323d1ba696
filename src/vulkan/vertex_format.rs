use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::mem::{offset_of, size_of};

/// Attribute within a binding; locations are assigned in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub format: vk::Format,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: vk::VertexInputRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttributeSlot {
    pub location: u32,
    pub binding: u32,
    pub format: vk::Format,
    pub offset: u32,
}

/// Vertex input layout for a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexFormat {
    bindings: Vec<VertexBinding>,
    attributes: Vec<VertexAttributeSlot>,
    vertex_size: u64,
}

impl VertexFormat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a binding numbered after the existing ones. A per-vertex binding sets the
    /// vertex size to its stride.
    pub fn add_binding(
        mut self,
        stride: u32,
        input_rate: vk::VertexInputRate,
        attributes: &[VertexAttribute],
    ) -> Self {
        let binding = self.bindings.len() as u32;
        if input_rate == vk::VertexInputRate::VERTEX {
            self.vertex_size = stride as u64;
        }

        for attribute in attributes {
            self.attributes.push(VertexAttributeSlot {
                location: self.attributes.len() as u32,
                binding,
                format: attribute.format,
                offset: attribute.offset,
            });
        }

        self.bindings.push(VertexBinding {
            binding,
            stride,
            input_rate,
        });
        self
    }

    pub fn vertex_size(&self) -> u64 {
        self.vertex_size
    }

    pub fn bindings(&self) -> &[VertexBinding] {
        &self.bindings
    }

    pub fn attributes(&self) -> &[VertexAttributeSlot] {
        &self.attributes
    }

    pub fn binding_descriptions(&self) -> Vec<vk::VertexInputBindingDescription> {
        self.bindings
            .iter()
            .map(|b| vk::VertexInputBindingDescription {
                binding: b.binding,
                stride: b.stride,
                input_rate: b.input_rate,
            })
            .collect()
    }

    pub fn attribute_descriptions(&self) -> Vec<vk::VertexInputAttributeDescription> {
        self.attributes
            .iter()
            .map(|a| vk::VertexInputAttributeDescription {
                location: a.location,
                binding: a.binding,
                format: a.format,
                offset: a.offset,
            })
            .collect()
    }

    pub fn primitive() -> Self {
        Self::new().add_binding(
            size_of::<PrimitiveVertex>() as u32,
            vk::VertexInputRate::VERTEX,
            &[VertexAttribute {
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(PrimitiveVertex, position) as u32,
            }],
        )
    }

    pub fn primitive_uv() -> Self {
        Self::new().add_binding(
            size_of::<PrimitiveUvVertex>() as u32,
            vk::VertexInputRate::VERTEX,
            &[
                VertexAttribute {
                    format: vk::Format::R32G32B32_SFLOAT,
                    offset: offset_of!(PrimitiveUvVertex, position) as u32,
                },
                VertexAttribute {
                    format: vk::Format::R32G32_SFLOAT,
                    offset: offset_of!(PrimitiveUvVertex, uv) as u32,
                },
            ],
        )
    }

    pub fn model() -> Self {
        let vec3 = |offset: usize| VertexAttribute {
            format: vk::Format::R32G32B32_SFLOAT,
            offset: offset as u32,
        };

        Self::new().add_binding(
            size_of::<ModelVertex>() as u32,
            vk::VertexInputRate::VERTEX,
            &[
                vec3(offset_of!(ModelVertex, position)),
                VertexAttribute {
                    format: vk::Format::R32G32_SFLOAT,
                    offset: offset_of!(ModelVertex, uv) as u32,
                },
                vec3(offset_of!(ModelVertex, colour)),
                vec3(offset_of!(ModelVertex, normal)),
                vec3(offset_of!(ModelVertex, tangent)),
                vec3(offset_of!(ModelVertex, bitangent)),
            ],
        )
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct PrimitiveVertex {
    pub position: [f32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct PrimitiveUvVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub colour: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
}
