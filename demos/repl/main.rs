//! An interactive shell that creates budgeted heap allocators and allocates
//! from them through type-erased references.

use std::{
    alloc::{alloc, dealloc, Layout},
    collections::{hash_map::Entry, HashMap},
    ptr::{self, NonNull},
};

use clap::Parser;
use linefeed::{Interface, ReadResult};
use portable_atomic::{AtomicUsize, Ordering};
use resource_ref::{
    Allocator, AsyncAllocator, AsyncResourceRef, Error, HasProperty, Property, ResourceRef,
    StreamRef, DEFAULT_ALIGNMENT,
};

use crate::parsing::Command;

mod parsing;

#[derive(Clone, Copy)]
struct HostAccessible;
impl Property for HostAccessible {
    type Value = ();
    const MARKER: Option<()> = Some(());
}

#[derive(Clone, Copy)]
struct Capacity;
impl Property for Capacity {
    type Value = usize;
}

#[derive(Clone, Copy)]
struct Used;
impl Property for Used {
    type Value = usize;
}

type Resource<'a> = AsyncResourceRef<'a, (HostAccessible, Capacity, Used)>;

/// The global heap, limited to `capacity` bytes in use at once.
struct Budget {
    capacity: usize,
    used: AtomicUsize,
}
impl Budget {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: AtomicUsize::new(0),
        }
    }
}
impl PartialEq for Budget {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self, other)
    }
}
unsafe impl Allocator for Budget {
    fn allocate(&self, bytes: usize, alignment: usize) -> resource_ref::Result<NonNull<u8>> {
        let layout =
            Layout::from_size_align(bytes, alignment).map_err(|_| Error::InvalidAlignment)?;
        if bytes == 0 {
            return Err(Error::ZeroSize);
        }
        self.used
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                used.checked_add(bytes).filter(|&used| used <= self.capacity)
            })
            .map_err(|_| Error::OutOfMemory)?;
        match NonNull::new(unsafe { alloc(layout) }) {
            Some(ptr) => Ok(ptr),
            None => {
                self.used.fetch_sub(bytes, Ordering::Relaxed);
                Err(Error::OutOfMemory)
            }
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, alignment: usize) {
        unsafe { dealloc(ptr.as_ptr(), Layout::from_size_align_unchecked(bytes, alignment)) };
        self.used.fetch_sub(bytes, Ordering::Relaxed);
    }
}
// The heap has no streams of its own, so every stream completes immediately.
unsafe impl AsyncAllocator for Budget {
    fn allocate_async(
        &self,
        bytes: usize,
        alignment: usize,
        _stream: StreamRef,
    ) -> resource_ref::Result<NonNull<u8>> {
        self.allocate(bytes, alignment)
    }

    unsafe fn deallocate_async(
        &self,
        ptr: NonNull<u8>,
        bytes: usize,
        alignment: usize,
        _stream: StreamRef,
    ) {
        unsafe { self.deallocate(ptr, bytes, alignment) }
    }
}
impl HasProperty<HostAccessible> for Budget {
    fn get_property(&self, _: HostAccessible) {}
}
impl HasProperty<Capacity> for Budget {
    fn get_property(&self, _: Capacity) -> usize {
        self.capacity
    }
}
impl HasProperty<Used> for Budget {
    fn get_property(&self, _: Used) -> usize {
        self.used.load(Ordering::Relaxed)
    }
}

struct Block {
    allocator: String,
    size: usize,
    align: usize,
    stream: StreamRef,
}

fn print(name: &str, resource: Resource<'_>) {
    println!(
        "{name}: {:#x} of {:#x} bytes used (properties: {})",
        resource.get_property(Used),
        resource.get_property(Capacity),
        resource.property_names().collect::<Vec<_>>().join(", ")
    );
}

fn main() -> anyhow::Result<()> {
    let interface = Interface::new("resource-ref")?;
    interface.set_prompt("[&] ")?;

    let mut allocators: HashMap<String, Box<Budget>> = HashMap::new();
    let mut blocks: HashMap<usize, Block> = HashMap::new();

    while let ReadResult::Input(command) = interface.read_line()? {
        match Command::try_parse_from(["[&]"].into_iter().chain(command.split(' '))) {
            Ok(Command::Exit) => break,
            Ok(Command::Create { name, capacity }) => match allocators.entry(name.clone()) {
                Entry::Vacant(entry) => {
                    entry.insert(Box::new(Budget::new(capacity)));
                    println!("Created allocator {name:?} with capacity {capacity:#x}");
                }
                Entry::Occupied(_) => {
                    println!("There is already an allocator named {name:?}");
                }
            },
            Ok(Command::Alloc {
                allocator: name,
                size,
                align,
                stream,
            }) => {
                let Some(allocator) = allocators.get(&name) else {
                    println!("There is no allocator named {name:?} :(");
                    continue;
                };
                let align = align.unwrap_or(DEFAULT_ALIGNMENT);
                let stream = stream.map_or(StreamRef::DEFAULT, StreamRef::from_raw);
                let resource = Resource::new(&**allocator);
                match resource.allocate_async(size, align, stream) {
                    Ok(ptr) => {
                        let base = ptr.as_ptr() as usize;
                        println!(
                            "Allocated {size:#x} bytes at {base:#x} on stream {:#x}",
                            stream.as_raw()
                        );
                        blocks.insert(
                            base,
                            Block {
                                allocator: name,
                                size,
                                align,
                                stream,
                            },
                        );
                    }
                    Err(Error::InvalidAlignment) => {
                        println!("The alignment must be a power of two!");
                    }
                    Err(err) => println!("Allocation failed: {err}"),
                }
            }
            Ok(Command::Free {
                allocator: name,
                base,
            }) => {
                let Some(allocator) = allocators.get(&name) else {
                    println!("There is no allocator named {name:?} :(");
                    continue;
                };
                match blocks.remove(&base) {
                    Some(block) if block.allocator == name => {
                        let Some(ptr) = NonNull::new(base as *mut u8) else {
                            unreachable!("recorded a null allocation");
                        };
                        let resource = Resource::new(&**allocator);
                        unsafe {
                            resource.deallocate_async(ptr, block.size, block.align, block.stream)
                        };
                        println!("Freed {base:#x}");
                    }
                    Some(block) => {
                        println!("{base:#x} belongs to {:?}, not {name:?}", block.allocator);
                        blocks.insert(base, block);
                    }
                    None => println!("There is no allocation at {base:#x}"),
                }
            }
            Ok(Command::Eq { left, right }) => {
                match (allocators.get(&left), allocators.get(&right)) {
                    (Some(l), Some(r)) => {
                        let full = Resource::new(&**l);
                        let narrowed = full.narrow::<(Capacity,), _>().as_sync();
                        let other = ResourceRef::<(Capacity,)>::new(&**r);
                        println!(
                            "{left:?} {} {right:?}",
                            if narrowed == other { "==" } else { "!=" }
                        );
                    }
                    _ => println!("Both allocators must exist :("),
                }
            }
            Ok(Command::Print { allocator: None }) => {
                if allocators.is_empty() {
                    println!("There are no allocators to print!");
                }
                for (name, allocator) in &allocators {
                    print(name, Resource::new(&**allocator));
                }
            }
            Ok(Command::Print {
                allocator: Some(name),
            }) => match allocators.get(&name) {
                Some(allocator) => print(&name, Resource::new(&**allocator)),
                None => println!("There is no allocator named {name:?} :("),
            },
            Ok(Command::Delete { allocator: name }) => {
                let live = blocks.values().filter(|b| b.allocator == name).count();
                if live != 0 {
                    println!("{name:?} still has {live} live allocations");
                    continue;
                }
                match allocators.remove(&name) {
                    Some(_) => println!("Deleted allocator {name:?}!"),
                    None => println!("There is no allocator named {name:?} :("),
                }
            }
            Err(err) => {
                println!();
                err.print()?;
                println!();
                continue;
            }
        }
    }

    for (base, block) in blocks {
        if let (Some(allocator), Some(ptr)) = (
            allocators.get(&block.allocator),
            NonNull::new(base as *mut u8),
        ) {
            let resource = Resource::new(&**allocator);
            unsafe { resource.deallocate_async(ptr, block.size, block.align, block.stream) };
        }
    }

    Ok(())
}
