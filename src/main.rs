fn main() {
    if let Err(err) = raster_layout::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
