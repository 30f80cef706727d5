use std::env;
use std::path::{Path, PathBuf};

const WATCHED: [&str; 5] = [
    "FFMPEG_DIR",
    "FFMPEG_PKG_CONFIG_PATH",
    "VCPKG_ROOT",
    "VCPKGRS_DYNAMIC",
    "VCPKGRS_TRIPLET",
];

fn hint(message: impl AsRef<str>) {
    println!("cargo:warning={}", message.as_ref());
}

fn check_ffmpeg_dir(dir: &Path) {
    if !dir.join("include").join("libavcodec").exists() {
        hint(format!(
            "FFMPEG_DIR={} has no include/libavcodec; ffmpeg-sys-next will likely fail to find the headers.",
            dir.display()
        ));
    }
}

fn windows_hints() {
    let Ok(vcpkg_root) = env::var("VCPKG_ROOT") else {
        hint("FFMPEG_DIR is not set. On Windows, install FFmpeg (vcpkg install ffmpeg) and set FFMPEG_DIR.");
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let installed = PathBuf::from(vcpkg_root).join("installed").join(triplet);
    if installed.exists() {
        hint(format!(
            "Found vcpkg FFmpeg at {}; set FFMPEG_DIR to that path to pin it.",
            installed.display()
        ));
    } else {
        hint(format!("No vcpkg FFmpeg install at {}.", installed.display()));
    }
}

fn main() {
    for variable in WATCHED {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    if let Some(dir) = env::var_os("FFMPEG_DIR") {
        check_ffmpeg_dir(Path::new(&dir));
        return;
    }

    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("windows") {
        windows_hints();
    }
}
