//! Region descriptors from decoded device-tree nodes.
//!
//! A pool node looks like this:
//!
//! ```text
//! oal_ddr0: oal-ddr0 {
//!     compatible = "fsl,oal-mem-reg";
//!     memory-region = <&ddr0_reserved>;
//!     id = <1>;
//!     align = <0x1000>;
//!     init;
//!     autobalance;
//! };
//! ```
//!
//! The `reg` pair and the name come from the node the `memory-region` phandle
//! points to.

use log::{error, info};
use oal_alloc::{
    ChunkHandle, MemoryAllocator, OalError, PhysBaseResolver, PhysMapper, RegionDescriptor,
    Result,
};
use oal_memory_addresses::{PageSize, PhysicalAddress};

/// Compatible string of a pool node.
pub const COMPATIBLE: &str = "fsl,oal-mem-reg";

/// The reserved-memory node a pool node refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedMemory<'a> {
    /// Full node name, unit address included.
    pub name: &'a str,
    pub base: u64,
    pub size: u64,
}

/// An already parsed device-tree node.
pub trait RegionNode {
    fn name(&self) -> &str;

    fn is_compatible(&self, compatible: &str) -> bool;

    /// Whether a (possibly empty) property is present.
    fn has_property(&self, name: &str) -> bool;

    fn property_u32(&self, name: &str) -> Option<u32>;

    /// Target of the `memory-region` phandle, with its `reg` decoded.
    fn memory_region(&self) -> Option<ReservedMemory<'_>>;
}

fn required_u32<N: RegionNode + ?Sized>(node: &N, property: &str) -> Result<u32> {
    node.property_u32(property).ok_or_else(|| {
        error!("{}: missing '{property}' property", node.name());
        OalError::InvalidRegion
    })
}

/// Build the descriptor of one pool node.
///
/// Limits are not checked here; registration does that.
///
/// # Errors
/// [`OalError::InvalidRegion`] if the node is not a pool node, or `id`,
/// `align` or the `memory-region` target is missing.
pub fn descriptor_from_node<N: RegionNode + ?Sized>(node: &N) -> Result<RegionDescriptor> {
    if !node.is_compatible(COMPATIBLE) {
        error!("{} is not compatible with {COMPATIBLE}", node.name());
        return Err(OalError::InvalidRegion);
    }

    let Some(memory) = node.memory_region() else {
        error!(
            "Failed to identify 'memory-region' for {}. Please review reg and memory-region attributes.",
            node.name()
        );
        return Err(OalError::InvalidRegion);
    };
    let id = required_u32(node, "id")?;
    let align = required_u32(node, "align")?;

    Ok(
        RegionDescriptor::new(memory.name, PhysicalAddress::new(memory.base), memory.size, id)
            .with_align(u64::from(align))
            .with_init(node.has_property("init"))
            .with_autobalance(node.has_property("autobalance")),
    )
}

/// Decode `node` and start managing its region.
///
/// # Errors
/// See [`descriptor_from_node`] and
/// [`MemoryAllocator::add_reserved_memory_region`].
pub fn probe<N, M, S, R>(
    allocator: &MemoryAllocator<S, R>,
    node: &N,
    mapper: &M,
) -> Result<ChunkHandle>
where
    N: RegionNode + ?Sized,
    M: PhysMapper + ?Sized,
    S: PageSize,
    R: PhysBaseResolver,
{
    let region = descriptor_from_node(node)?;
    let handle = allocator.add_reserved_memory_region(region, mapper)?;
    info!("{}: pool {} ready", node.name(), region.start_id());
    Ok(handle)
}
