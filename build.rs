// build.rs

use chrono::Utc;
use std::env;
use std::fs;
use std::path::Path;

fn main() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let dest_path = Path::new(&out_dir).join("build_info.rs");

    let build_date = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let git_rev = env::var("PRICERING_GIT_REV").unwrap_or_else(|_| "unknown".to_string());

    // BUILD_DATE and BUILD_REV end up in the start-up banner
    fs::write(
        &dest_path,
        format!(
            "pub const BUILD_DATE: &str = \"{}\";\npub const BUILD_REV: &str = \"{}\";\n",
            build_date,
            git_rev.escape_default()
        ),
    )
    .expect("write build_info.rs");

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=PRICERING_GIT_REV");
}
