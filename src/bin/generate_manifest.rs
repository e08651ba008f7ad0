use std::env;
use std::path::PathBuf;
use studio_core::registry::{self, manifest};

fn main() {
    if let Err(err) = run() {
        eprintln!("[manifest] error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let output_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("schemas/class_manifest.json"));

    let registry = registry::builtin();
    let written = manifest::write_manifest_json(&registry, &output_path)?;
    println!("[manifest] wrote {written} classes to {}", output_path.display());
    Ok(())
}
