fn main() {
    // The ESP-IDF build system only applies when cross-compiling for the
    // Xtensa target; host builds (tests) must not touch it.
    if let Ok(target) = std::env::var("TARGET") {
        if target.contains("xtensa") {
            embuild::espidf::sysenv::output();
        }
    }
}
