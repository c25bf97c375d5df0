//! Installs [`BreakAlloc`] as the process-wide global allocator and lets
//! ordinary std containers run over it, including from multiple threads.
//!
//! [`BreakAlloc`]: breakalloc::BreakAlloc

use std::thread;

use breakalloc::BreakAlloc;

#[global_allocator]
static ALLOCATOR: BreakAlloc = BreakAlloc;

fn main() {
    // Box example
    let boxed = Box::new(22);
    println!("Box value: {}, at: {:p}", boxed, boxed);

    // Vec example, growing through several reallocations
    let mut v = Vec::new();
    for i in 0..5 {
        v.push(i * 10);
        println!("Added {}; capacity: {}; at: {:p}", v[i], v.capacity(), v.as_ptr());
    }

    // String example
    let msg = String::from("break-backed heap");
    println!("String '{}' at: {:p}", msg, msg.as_ptr());

    // Recycling example: freeing an interior block leaves it available
    // for the next fit-sized request.
    let a = Box::new([0u8; 64]);
    let _b = Box::new([0u8; 64]);
    let ptr_a = a.as_ptr();

    drop(a);

    let c = Box::new([0u8; 48]);
    if ptr_a == c.as_ptr() {
        println!("recycled the freed block at {:p}", c.as_ptr());
    } else {
        println!("fresh block: a was at {:p}, c is at {:p}", ptr_a, c.as_ptr());
    }

    // Thread example: the global lock serializes the arena.
    let handles: Vec<_> = (0..4)
        .map(|t| {
            thread::spawn(move || {
                let local: Vec<usize> = (0..64).map(|i| i * t).collect();
                local.iter().sum::<usize>()
            })
        })
        .collect();

    for handle in handles {
        println!("thread sum: {}", handle.join().unwrap());
    }
}
