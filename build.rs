//! Build script for the rsocket-bridge crate.
//!
//! With the `linked` feature enabled, emits the link directives for the native
//! RSocket library. Without it the crate needs no native code at all.

use std::env;
use std::path::PathBuf;

const DEFAULT_LIB_NAME: &str = "rsocket_rust_go";

fn main() {
    println!("cargo:rerun-if-env-changed=RSOCKET_FFI_LIB_DIR");
    println!("cargo:rerun-if-env-changed=RSOCKET_FFI_LIB_NAME");
    println!("cargo:rerun-if-env-changed=RSOCKET_FFI_STATIC");

    if env::var_os("CARGO_FEATURE_LINKED").is_none() {
        return;
    }

    let lib_name = env::var("RSOCKET_FFI_LIB_NAME").unwrap_or_else(|_| DEFAULT_LIB_NAME.to_string());
    let link_static = env::var("RSOCKET_FFI_STATIC").map(|v| v == "1").unwrap_or(false);

    match env::var("RSOCKET_FFI_LIB_DIR") {
        Ok(dir) => {
            let lib_dir = PathBuf::from(dir);
            if !lib_dir.exists() {
                println!(
                    "cargo:warning=RSOCKET_FFI_LIB_DIR {} does not exist",
                    lib_dir.display()
                );
            }
            println!("cargo:rustc-link-search=native={}", lib_dir.display());
        }
        Err(_) => {
            println!(
                "cargo:warning=RSOCKET_FFI_LIB_DIR not set, relying on the system linker path for lib{}",
                lib_name
            );
        }
    }

    if link_static {
        println!("cargo:rustc-link-lib=static={}", lib_name);
        emit_platform_libs();
    } else {
        println!("cargo:rustc-link-lib=dylib={}", lib_name);
    }
}

/// The static archive carries its own Rust runtime and needs the system
/// libraries it was built against.
fn emit_platform_libs() {
    #[cfg(target_os = "linux")]
    {
        println!("cargo:rustc-link-lib=pthread");
        println!("cargo:rustc-link-lib=dl");
        println!("cargo:rustc-link-lib=m");
    }

    #[cfg(target_os = "macos")]
    {
        println!("cargo:rustc-link-lib=framework=CoreFoundation");
        println!("cargo:rustc-link-lib=framework=Security");
    }

    #[cfg(target_os = "windows")]
    {
        println!("cargo:rustc-link-lib=ws2_32");
        println!("cargo:rustc-link-lib=advapi32");
        println!("cargo:rustc-link-lib=ntdll");
        println!("cargo:rustc-link-lib=userenv");
        println!("cargo:rustc-link-lib=bcrypt");
    }
}
