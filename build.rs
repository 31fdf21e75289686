use std::process::Command;

#[allow(unused)]
macro_rules! warn {
    ($($tokens: tt)*) => {
        println!("cargo:warning={}", format!($($tokens)*))
    }
}

/// Set environment varibles for build.rs
/// set_env!(NAME=xfy);
macro_rules! set_env {
    ($($tokens: tt)*) => {
        println!("cargo:rustc-env={}", format!($($tokens)*))
    };
}

fn main() {
    rustc_info();
    commit_info();
}

fn rustc_info() {
    let rustc_output = Command::new("rustc")
        .args(["-vV"])
        .output()
        .map(|output| output.stdout)
        .unwrap_or_default();
    let info_str = String::from_utf8_lossy(&rustc_output);
    let compiler = info_str
        .split('\n')
        .find(|info| !info.is_empty())
        .unwrap_or("rustc unknown");

    set_env!("LARDER_COMPILER={}", compiler);
}

fn commit_info() {
    let commit = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    set_env!("LARDER_COMMIT={}", commit);
}
