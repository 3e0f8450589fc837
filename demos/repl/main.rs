//! An interactive playground for pool allocators. Every command runs on the
//! same thread, so `alloc` on a pool that was requested but never injected
//! would spin forever; the REPL refuses to do that and asks for an `inject`
//! first.

use std::collections::hash_map::Entry;

use clap::Parser;
use linefeed::{Interface, ReadResult};
use rtbump::{Error, Heap, PoolAllocator, SlotState};
use rustc_hash::FxHashMap;

use crate::parsing::Command;

mod parsing;

type Pools = PoolAllocator<'static, Heap>;

/// Whether an allocation of `padded` bytes could have to wait for a pending
/// pool.
fn would_wait(pools: &Pools, padded: usize) -> bool {
    let end = pools.reserved() + padded;
    let last = (end.saturating_sub(1) / pools.pool_size()).min(pools.pool_count() - 1);
    (0..=last).any(|index| pools.slot_state(index) == Some(SlotState::Pending))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let interface = Interface::new("rtbump-repl")?;
    interface.set_prompt("[∴] ")?;

    let mut allocators: FxHashMap<String, Pools> = FxHashMap::default();

    while let ReadResult::Input(command) = interface.read_line()? {
        match Command::try_parse_from(["[∴]"].into_iter().chain(command.split(' '))) {
            Ok(Command::Exit) => break,
            Ok(Command::Create {
                name,
                pools,
                pool_size,
            }) => match allocators.entry(name.clone()) {
                Entry::Vacant(entry) => {
                    match Pools::create(Box::leak(name.into_boxed_str()), pools, pool_size, Heap) {
                        Ok(allocator) => {
                            println!(
                                "Created allocator {:?} with {} pools of {:#x} bytes",
                                allocator.label(),
                                allocator.pool_count(),
                                allocator.pool_size()
                            );
                            entry.insert(allocator);
                        }
                        Err(Error::InvalidPoolCount) => {
                            println!("There must be at least one pool!");
                        }
                        Err(Error::PoolSizeOverflow) => {
                            println!("That is more memory than the address space can hold!");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Entry::Occupied(_) => {
                    println!("There is already an allocator named {name:?}");
                }
            },
            Ok(Command::Alloc {
                allocator,
                size,
                align,
                inject,
            }) => {
                let Some(pools) = allocators.get(&allocator) else {
                    println!("There is no allocator named {allocator:?} :(");
                    continue;
                };
                if would_wait(pools, size.saturating_add(align.saturating_sub(1))) {
                    println!("That allocation would wait for a pool nobody injected. Inject first!");
                    continue;
                }
                match pools.alloc_aligned(size, align) {
                    Ok(block) => {
                        println!("Allocated {:#x} bytes at {:p}", block.len(), block.as_ptr());
                        if block.more_needed() {
                            if inject {
                                let index = pools.inject()?;
                                println!("Injected pool {index}");
                            } else {
                                println!("The next pool was requested; remember to inject it!");
                            }
                        }
                    }
                    Err(Error::AllocZeroSize) => println!("The size must not be zero!"),
                    Err(Error::RequestTooLarge { size, pool_size }) => {
                        println!("{size:#x} bytes do not fit in a pool of {pool_size:#x} bytes!")
                    }
                    Err(Error::InvalidAlign { align }) => {
                        println!("An alignment of {align:#x} is not supported!")
                    }
                    Err(Error::CapacityExhausted) => println!("That allocator is full!"),
                    Err(Error::PoolAbsent { index }) => {
                        println!("The allocation landed in pool {index}, which was never requested!")
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(Command::Inject { allocator }) => {
                match allocators.get(&allocator) {
                    Some(pools) => match pools.inject() {
                        Ok(index) => println!("Injected pool {index}"),
                        Err(Error::DoubleInjection) => {
                            println!("No pool is waiting to be injected!")
                        }
                        Err(e) => return Err(e.into()),
                    },
                    None => {
                        println!("There is no allocator named {allocator:?} :(");
                    }
                };
            }
            Ok(Command::Print { allocator: None }) => {
                if !allocators.is_empty() {
                    println!();
                    for pools in allocators.values() {
                        println!("{:?}", pools);
                    }
                } else {
                    println!("There are no allocators to print!");
                }
            }
            Ok(Command::Print {
                allocator: Some(allocator),
            }) => {
                match allocators.get(&allocator) {
                    Some(pools) => println!("\n{:?}", pools),
                    None => {
                        println!("There is no allocator named {allocator:?} :(");
                    }
                };
            }
            Ok(Command::Delete { allocator: name }) => {
                match allocators.remove(&name) {
                    Some(pools) => {
                        free_label(pools);
                        println!("Deleted allocator {:?}!", name);
                    }
                    None => {
                        println!("There is no allocator named {name:?} :(");
                    }
                };
            }
            Err(err) => {
                println!();
                err.print()?;
                println!();
                continue;
            }
        }
    }

    for (_, pools) in allocators {
        free_label(pools);
    }

    Ok(())
}

/// Drop the allocator, then free the label that was leaked to create it.
fn free_label(pools: Pools) {
    let label = pools.label();
    drop(pools);
    let _ = unsafe { Box::from_raw(label as *const str as *mut str) };
}
