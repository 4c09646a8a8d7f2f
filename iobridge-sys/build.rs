extern crate cc;

fn build_wrapper() {
    cc::Build::new()
        .file("logwrapper.c")
        .include(".")
        .flag_if_supported("-Wno-unused-parameter")
        .compile("logwrapper");
}

fn main() {
    #![allow(unreachable_code)]
    #[cfg(not(target_os = "linux"))]
    panic!("iobridge-sys crate works only on linux");

    build_wrapper();

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=logwrapper.h");
    println!("cargo:rerun-if-changed=logwrapper.c");
}
