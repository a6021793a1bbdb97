use vellum_gpu::{Backend, BACKEND_ENV};
use vellum_paint::config::{HEIGHT_ENV, WIDTH_ENV};
use vellum_paint::{CanvasConfig, GpuCanvas};

// Environment variables are process-wide, so every override check lives in
// this single test.
#[test]
fn environment_overrides_config_and_canvas_follows() {
    let config = CanvasConfig::from_toml("width = 64\nheight = 48\nbackend = \"auto\"").unwrap();

    std::env::set_var(BACKEND_ENV, "CPU");
    std::env::set_var(WIDTH_ENV, "16");
    std::env::set_var(HEIGHT_ENV, "not-a-number");
    let config = config.with_env_overrides();
    std::env::remove_var(BACKEND_ENV);
    std::env::remove_var(WIDTH_ENV);
    std::env::remove_var(HEIGHT_ENV);

    assert_eq!(config.backend, Backend::Software);
    assert_eq!(config.width, 16);
    assert_eq!(config.height, 48);

    let canvas = GpuCanvas::from_config(&config).unwrap();
    assert_eq!(canvas.size(), (16, 48));
    assert_eq!(canvas.backend(), Backend::Software);
    assert_eq!(canvas.end().unwrap().len(), 16 * 48 * 4);
}
