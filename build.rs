fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Plugins find the host entry points in the global symbol table, which on
    // Linux only includes executable symbols when linked with -rdynamic.
    // Integration tests bootstrap against that table too.
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os == "linux" || target_os == "freebsd" {
        println!("cargo:rustc-link-arg-bins=-rdynamic");
        println!("cargo:rustc-link-arg-tests=-rdynamic");
    }
}
