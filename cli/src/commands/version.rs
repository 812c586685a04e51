//! Version command.

pub fn run() {
    println!("stratum {}", stratum_core::VERSION);
}
