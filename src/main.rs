fn main() {
    retention_pipeline::cli::run();
}
