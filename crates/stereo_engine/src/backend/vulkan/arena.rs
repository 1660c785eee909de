//! GPU memory arena
//!
//! Two fixed-size device allocations (device-local and host-visible/coherent)
//! are made once at startup and sub-allocated by bump pointer for every
//! buffer and image in the process. Both render loops allocate from the same
//! arena concurrently; each region's cursor is guarded by its own mutex.
//!
//! There is no `free` for individual sub-allocations. Offsets only grow, and
//! running out of a region is a capacity misconfiguration surfaced as
//! [`VulkanError::ArenaExhausted`], not a condition the engine recovers from.
//! The backing allocations are released as a whole when the arena is dropped,
//! after the device has been idled.

use std::sync::Mutex;

use ash::vk;

use crate::backend::vulkan::{VulkanError, VulkanResult};
use crate::foundation::math::align_up;

/// Selector for one of the arena's two backing regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaRegion {
    /// Device-local memory for render targets, mesh and texture data.
    DeviceLocal,
    /// Host-visible, host-coherent memory for staging and uniform data.
    HostVisible,
}

impl ArenaRegion {
    fn index(self) -> usize {
        match self {
            ArenaRegion::DeviceLocal => 0,
            ArenaRegion::HostVisible => 1,
        }
    }
}

/// A sub-allocation inside one of the arena regions.
///
/// The block does not own the memory; it is a handle + range the caller binds
/// buffers or images against. Blocks stay valid for the arena's lifetime.
#[derive(Debug, Clone, Copy)]
pub struct ArenaBlock {
    /// Backing device memory handle.
    pub memory: vk::DeviceMemory,
    /// Byte offset of this block inside the backing allocation.
    pub offset: vk::DeviceSize,
    /// Size of the block in bytes.
    pub size: vk::DeviceSize,
}

/// A host-visible allocation with a persistent CPU mapping.
///
/// The pointer stays valid until the arena is dropped.
pub struct MappedBlock {
    /// The backing allocation.
    pub block: ArenaBlock,
    ptr: *mut u8,
}

// Safety: the mapping stays valid for the arena's lifetime and writes through
// it are externally synchronized by the frame fence discipline (a slot is
// only rewritten once its fence has signaled).
unsafe impl Send for MappedBlock {}
unsafe impl Sync for MappedBlock {}

impl MappedBlock {
    /// Raw pointer to the start of the mapping.
    pub fn ptr(&self) -> *mut u8 {
        self.ptr
    }

    /// Copy `data` into the mapping at `offset` bytes.
    ///
    /// # Panics
    /// Panics if the write would run past the end of the block.
    pub fn write(&self, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= self.block.size as usize);
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.add(offset), data.len());
        }
    }
}

/// Monotonic bump cursor over a fixed capacity.
///
/// Kept free of any Vulkan types so the non-overlap and capacity invariants
/// can be exercised directly in tests.
#[derive(Debug)]
pub(crate) struct BumpCursor {
    offset: u64,
    capacity: u64,
}

impl BumpCursor {
    pub(crate) fn new(capacity: u64) -> Self {
        Self { offset: 0, capacity }
    }

    /// Reserve `size` bytes at the next offset aligned to `alignment`.
    ///
    /// Returns the start offset, or `None` if the reservation would exceed
    /// capacity. Offsets never decrease and returned ranges never overlap.
    pub(crate) fn reserve(&mut self, size: u64, alignment: u64) -> Option<u64> {
        let start = align_up(self.offset, alignment);
        let end = start.checked_add(size)?;
        if end > self.capacity {
            return None;
        }
        self.offset = end;
        Some(start)
    }

    pub(crate) fn remaining(&self) -> u64 {
        self.capacity - self.offset
    }
}

struct MappedAllocation {
    memory: vk::DeviceMemory,
    ptr: *mut u8,
}

/// The process-wide GPU memory arena. See the module docs.
pub struct MemoryArena {
    device: ash::Device,
    memories: [vk::DeviceMemory; 2],
    cursors: [Mutex<BumpCursor>; 2],
    host_type_index: u32,
    mapped: Mutex<Vec<MappedAllocation>>,
}

// Safety: cursor state and the mapped list are mutex-guarded; the raw
// pointers in `mapped` are only dereferenced through `MappedBlock`.
unsafe impl Send for MemoryArena {}
unsafe impl Sync for MemoryArena {}

impl MemoryArena {
    /// Allocate both backing regions.
    ///
    /// Picks the device-local and host-visible/coherent memory types with the
    /// largest heaps, the same policy for every GPU driver layout.
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        device_local_size: vk::DeviceSize,
        host_visible_size: vk::DeviceSize,
    ) -> VulkanResult<Self> {
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let mut device_type_index = None;
        let mut device_heap_size = 0;
        let mut host_type_index = None;
        let mut host_heap_size = 0;

        let host_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        for i in 0..memory_properties.memory_type_count {
            let memory_type = memory_properties.memory_types[i as usize];
            let heap = memory_properties.memory_heaps[memory_type.heap_index as usize];

            if memory_type
                .property_flags
                .contains(vk::MemoryPropertyFlags::DEVICE_LOCAL)
                && heap.size > device_heap_size
            {
                device_type_index = Some(i);
                device_heap_size = heap.size;
            }

            if memory_type.property_flags.contains(host_flags) && heap.size > host_heap_size {
                host_type_index = Some(i);
                host_heap_size = heap.size;
            }
        }

        let device_type_index = device_type_index.ok_or_else(|| {
            VulkanError::Config("no device-local memory type available".to_string())
        })?;
        let host_type_index = host_type_index.ok_or_else(|| {
            VulkanError::Config("no host-visible coherent memory type available".to_string())
        })?;

        log::info!(
            "Allocating memory arena: {} MiB device-local, {} MiB host-visible",
            device_local_size / (1024 * 1024),
            host_visible_size / (1024 * 1024)
        );

        let device_memory = unsafe {
            device.allocate_memory(
                &vk::MemoryAllocateInfo::builder()
                    .allocation_size(device_local_size)
                    .memory_type_index(device_type_index),
                None,
            )?
        };

        let host_memory = unsafe {
            device.allocate_memory(
                &vk::MemoryAllocateInfo::builder()
                    .allocation_size(host_visible_size)
                    .memory_type_index(host_type_index),
                None,
            )?
        };

        Ok(Self {
            device,
            memories: [device_memory, host_memory],
            cursors: [
                Mutex::new(BumpCursor::new(device_local_size)),
                Mutex::new(BumpCursor::new(host_visible_size)),
            ],
            host_type_index,
            mapped: Mutex::new(Vec::new()),
        })
    }

    /// Sub-allocate a block satisfying `requirements` from `region`.
    ///
    /// Safe to call from any thread; the region cursor is locked internally.
    pub fn allocate(
        &self,
        region: ArenaRegion,
        requirements: vk::MemoryRequirements,
    ) -> VulkanResult<ArenaBlock> {
        let index = region.index();
        let mut cursor = self.cursors[index].lock().expect("arena cursor poisoned");
        let offset = cursor
            .reserve(requirements.size, requirements.alignment)
            .ok_or(VulkanError::ArenaExhausted {
                region,
                requested: requirements.size,
                remaining: cursor.remaining(),
            })?;

        Ok(ArenaBlock {
            memory: self.memories[index],
            offset,
            size: requirements.size,
        })
    }

    /// Sub-allocate device-local memory for `buffer`.
    pub fn allocate_buffer(
        &self,
        region: ArenaRegion,
        buffer: vk::Buffer,
    ) -> VulkanResult<ArenaBlock> {
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        self.allocate(region, requirements)
    }

    /// Sub-allocate device-local memory for `image`.
    pub fn allocate_image(
        &self,
        region: ArenaRegion,
        image: vk::Image,
    ) -> VulkanResult<ArenaBlock> {
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        self.allocate(region, requirements)
    }

    /// Allocate host memory for `buffer` with a persistent CPU mapping.
    ///
    /// Mapped allocations are dedicated (they do not advance the host
    /// region's cursor) and are tracked so they can be released when the
    /// arena is dropped. The mapping stays valid for the arena's lifetime.
    pub fn allocate_mapped(&self, buffer: vk::Buffer) -> VulkanResult<MappedBlock> {
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let memory = unsafe {
            self.device.allocate_memory(
                &vk::MemoryAllocateInfo::builder()
                    .allocation_size(requirements.size)
                    .memory_type_index(self.host_type_index),
                None,
            )?
        };

        let ptr = unsafe {
            self.device
                .map_memory(memory, 0, requirements.size, vk::MemoryMapFlags::empty())?
        }
        .cast::<u8>();

        self.mapped
            .lock()
            .expect("arena mapped list poisoned")
            .push(MappedAllocation { memory, ptr });

        Ok(MappedBlock {
            block: ArenaBlock {
                memory,
                offset: 0,
                size: requirements.size,
            },
            ptr,
        })
    }
}

impl Drop for MemoryArena {
    fn drop(&mut self) {
        unsafe {
            for memory in self.memories {
                self.device.free_memory(memory, None);
            }
            for mapped in self.mapped.lock().expect("arena mapped list poisoned").drain(..) {
                self.device.free_memory(mapped.memory, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn assert_disjoint(ranges: &[(u64, u64)]) {
        for (i, a) in ranges.iter().enumerate() {
            for b in ranges.iter().skip(i + 1) {
                assert!(
                    a.1 <= b.0 || b.1 <= a.0,
                    "ranges overlap: [{}, {}) and [{}, {})",
                    a.0,
                    a.1,
                    b.0,
                    b.1
                );
            }
        }
    }

    #[test]
    fn reservations_are_aligned_and_disjoint() {
        let mut cursor = BumpCursor::new(1 << 20);
        let requests = [
            (100u64, 1u64),
            (256, 256),
            (1, 64),
            (4096, 4096),
            (17, 2),
            (513, 128),
            (65536, 65536),
        ];

        let mut ranges = Vec::new();
        for &(size, alignment) in &requests {
            let offset = cursor.reserve(size, alignment).expect("fits in region");
            assert_eq!(offset % alignment, 0, "offset {offset} not aligned to {alignment}");
            ranges.push((offset, offset + size));
        }
        assert_disjoint(&ranges);

        // Offsets never decrease.
        for pair in ranges.windows(2) {
            assert!(pair[1].0 >= pair[0].1);
        }
    }

    #[test]
    fn exact_fit_succeeds_and_overflow_fails() {
        let mut cursor = BumpCursor::new(1024);
        assert_eq!(cursor.reserve(512, 1), Some(0));
        // Exactly fills the region.
        assert_eq!(cursor.reserve(512, 1), Some(512));
        assert_eq!(cursor.remaining(), 0);
        // One more byte fails deterministically.
        assert_eq!(cursor.reserve(1, 1), None);
    }

    #[test]
    fn alignment_padding_counts_against_capacity() {
        let mut cursor = BumpCursor::new(1024);
        assert_eq!(cursor.reserve(1, 1), Some(0));
        // Next aligned offset is 512; 513 bytes no longer fit.
        assert_eq!(cursor.reserve(513, 512), None);
        // But 512 bytes at offset 512 do.
        assert_eq!(cursor.reserve(512, 512), Some(512));
    }

    #[test]
    fn concurrent_reservations_stay_disjoint() {
        let cursor = Arc::new(Mutex::new(BumpCursor::new(1 << 24)));
        let ranges = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for thread_index in 0..4u64 {
            let cursor = Arc::clone(&cursor);
            let ranges = Arc::clone(&ranges);
            handles.push(std::thread::spawn(move || {
                for i in 0..256u64 {
                    let size = 1 + (thread_index * 37 + i * 13) % 900;
                    let alignment = 1 << ((thread_index + i) % 9);
                    let offset = cursor
                        .lock()
                        .unwrap()
                        .reserve(size, alignment)
                        .expect("region sized for all threads");
                    assert_eq!(offset % alignment, 0);
                    ranges.lock().unwrap().push((offset, offset + size));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut ranges = ranges.lock().unwrap().clone();
        ranges.sort_unstable();
        for pair in ranges.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "concurrent ranges overlap");
        }
    }
}
