//! Build script for dalek-voice.

use std::{env, fs, path::PathBuf};

fn main() {
    println!("cargo:rustc-check-cfg=cfg(rust_analyzer)");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    // Handle memory.x based on target
    let target = env::var("TARGET").unwrap();

    let memory_file = if target.starts_with("thumbv8m") {
        // Pico 2 ARM
        Some("memory-pico2.x")
    } else if target.starts_with("riscv32imac") {
        // Pico 2 RISC-V
        Some("memory-pico2-riscv.x")
    } else if target.starts_with("thumbv6m") {
        // Pico 1
        Some("memory-pico1.x")
    } else {
        // Host tests link no memory map
        None
    };

    if let Some(memory_file) = memory_file {
        let memory_x = fs::read_to_string(memory_file)
            .unwrap_or_else(|_| panic!("Failed to read {memory_file}"));
        let dest = out_dir.join("memory.x");
        fs::write(&dest, memory_x).expect("Failed to write memory.x");
        println!("cargo:rustc-link-search={}", out_dir.display());
        println!("cargo:rerun-if-changed={memory_file}");
    }
}
