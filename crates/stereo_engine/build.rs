// build.rs
// Compiles GLSL shaders to SPIR-V with glslc from the Vulkan SDK.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=../../resources/shaders");

    // Allow skipping shader compilation with an env var
    let skip_shaders = env::var("SKIP_SHADERS").is_ok();
    if skip_shaders {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let vulkan_sdk = match env::var("VULKAN_SDK") {
        Ok(sdk) => sdk,
        Err(_) => {
            println!("cargo:rerun-if-env-changed=VULKAN_SDK");
            eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
            return;
        }
    };

    let glslc = if cfg!(target_os = "windows") {
        format!("{}\\Bin\\glslc.exe", vulkan_sdk)
    } else {
        format!("{}/bin/glslc", vulkan_sdk)
    };

    if !Path::new(&glslc).exists() {
        eprintln!("warning: glslc not found at {}, shader compilation skipped", glslc);
        return;
    }

    let shader_dir = PathBuf::from("../../resources/shaders");
    let target_dir = PathBuf::from("../../target/shaders");

    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        eprintln!("warning: Failed to create shader output directory: {}", e);
        return;
    }

    let shader_files = match std::fs::read_dir(&shader_dir) {
        Ok(files) => files,
        Err(_) => {
            eprintln!("info: No shader directory found at: {:?}", shader_dir);
            return;
        }
    };

    for entry in shader_files.flatten() {
        let path = entry.path();
        let is_shader = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("vert") | Some("frag") | Some("comp")
        );
        if !is_shader {
            continue;
        }

        let out_file = target_dir
            .join(path.file_stem().unwrap())
            .with_extension("spv");

        let needs_compile = match (std::fs::metadata(&path), std::fs::metadata(&out_file)) {
            (Ok(src), Ok(dst)) => match (src.modified(), dst.modified()) {
                (Ok(s), Ok(d)) => s > d,
                _ => true,
            },
            _ => true,
        };
        if !needs_compile {
            continue;
        }

        let status = Command::new(&glslc).arg(&path).arg("-o").arg(&out_file).status();
        match status {
            Ok(s) if s.success() => {
                eprintln!("info: Compiled {:?}", path.file_name().unwrap());
            }
            Ok(s) => {
                eprintln!(
                    "error: glslc failed for {:?} with exit code {}",
                    path,
                    s.code().unwrap_or(-1)
                );
                panic!("Shader compilation failed");
            }
            Err(e) => {
                eprintln!("error: failed to run glslc: {}", e);
                panic!("Shader compilation failed");
            }
        }
    }
}
