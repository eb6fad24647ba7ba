//! Named constants recovered from a compiled module's uniform block.

use std::collections::HashMap;

use naga::{AddressSpace, ArraySize, Handle, ResourceBinding, ScalarKind, Type, TypeInner};

use crate::types::{ConstantBlock, ConstantLocation};

/// Float locations of the members of the block at set 0, binding 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ConstantLayout {
    members: HashMap<String, ConstantLocation>,
}

impl ConstantLayout {
    pub fn from_spirv(words: &[u32]) -> Result<Self, naga::front::spv::Error> {
        let frontend = naga::front::spv::Frontend::new(
            words.iter().copied(),
            &naga::front::spv::Options::default(),
        );
        Ok(Self::from_module(&frontend.parse()?))
    }

    pub fn from_module(module: &naga::Module) -> Self {
        let mut layout = Self::default();
        let block = module.global_variables.iter().find_map(|(_, var)| {
            let bound = var.binding == Some(ResourceBinding { group: 0, binding: 0 });
            (bound && var.space == AddressSpace::Uniform).then_some(var.ty)
        });
        let Some(block) = block else {
            return layout;
        };
        let TypeInner::Struct { members, .. } = &module.types[block].inner else {
            return layout;
        };

        for member in members {
            let Some(name) = &member.name else {
                continue;
            };
            let Some(components) = float_components(&module.types, member.ty) else {
                tracing::debug!(constant = %name, "ignoring non-float constant");
                continue;
            };
            let location = ConstantLocation {
                offset: member.offset as usize / 4,
                components,
            };
            if member.offset % 4 != 0 || location.offset + components > ConstantBlock::FLOATS {
                tracing::warn!(
                    constant = %name,
                    offset = member.offset,
                    "constant lies outside the {}-byte block",
                    ConstantBlock::SIZE
                );
                continue;
            }
            layout.members.insert(name.clone(), location);
        }
        layout
    }

    pub fn get(&self, name: &str) -> Option<ConstantLocation> {
        self.members.get(name).copied()
    }

    /// Adds `other`'s members; on a name clash `other` wins.
    pub fn merge(&mut self, other: &Self) {
        self.members
            .extend(other.members.iter().map(|(name, location)| (name.clone(), *location)));
    }
}

fn float_components(types: &naga::UniqueArena<Type>, ty: Handle<Type>) -> Option<usize> {
    match &types[ty].inner {
        TypeInner::Scalar(scalar) if scalar.kind == ScalarKind::Float && scalar.width == 4 => {
            Some(1)
        }
        TypeInner::Vector { size, scalar }
            if scalar.kind == ScalarKind::Float && scalar.width == 4 =>
        {
            Some(*size as usize)
        }
        TypeInner::Array {
            base,
            size: ArraySize::Constant(count),
            stride,
        } => {
            // Only tightly packed arrays (vec4 under std140) map onto the block.
            let element = float_components(types, *base)?;
            (*stride as usize == element * 4).then(|| element * count.get() as usize)
        }
        _ => None,
    }
}
