//! Exercises the four crate-level operations against the real process
//! break: allocate, zero_allocate, resize, and release.

use std::ptr::NonNull;

fn log_block(label: &str, payload: Option<NonNull<u8>>) {
    match payload {
        Some(p) => println!("{label}: got {:p}", p.as_ptr()),
        None => println!("{label}: refused"),
    }
}

fn main() {
    let a = breakalloc::allocate(24);
    log_block("allocate(24)", a);

    let b = breakalloc::allocate(64);
    log_block("allocate(64)", b);

    // Zeroed array of 8 u32-sized elements.
    let c = breakalloc::zero_allocate(8, 4);
    log_block("zero_allocate(8, 4)", c);
    if let Some(c) = c {
        let all_zero = (0..32).all(|i| unsafe { *c.as_ptr().add(i) } == 0);
        println!("payload zeroed: {all_zero}");
    }

    unsafe {
        if let Some(a) = a {
            // a is interior now, so this only flags it free.
            breakalloc::release(a.as_ptr());
            println!("released {:p}", a.as_ptr());
        }

        // A fit-sized request should recycle a's block.
        let reused = breakalloc::allocate(16);
        log_block("allocate(16)", reused);
        match (a, reused) {
            (Some(a), Some(r)) if a == r => println!("recycled the freed block"),
            _ => println!("handed out a fresh block"),
        }

        if let Some(b) = b {
            let grown = breakalloc::resize(b.as_ptr(), 256);
            log_block("resize(b, 256)", grown);

            if let Some(grown) = grown {
                breakalloc::release(grown.as_ptr());
            }
        }
        if let Some(c) = c {
            breakalloc::release(c.as_ptr());
        }
        if let Some(r) = reused {
            breakalloc::release(r.as_ptr());
        }
    }

    println!("done");
}
