fn main() {
    built::write_built_file().expect("Failed to acquire build-time information");

    // Pass through VIGIL_GIT_HASH from Nix build environment
    println!("cargo:rerun-if-env-changed=VIGIL_GIT_HASH");
    if let Ok(hash) = std::env::var("VIGIL_GIT_HASH") {
        println!("cargo:rustc-env=VIGIL_GIT_HASH={}", hash);
    }
}
