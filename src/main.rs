fn main() {
    scrapechain::cli::run();
}
