use anyhow::Result;
use rsforest::commons::global_variables::GROUND_CLASS;
use rsforest::config::InventoryConfig;
use rsforest::geometric::trees::NoAllometry;
use rsforest::inventory::TreeInventory;
use rsforest::point_cloud::PointCloud;

const VEGETATION_CLASS: u8 = 5;

/// Ground on a gentle slope plus a few conical crowns `(x, y, height, radius)`.
fn synthetic_plot(trees: &[(f64, f64, f64, f64)]) -> PointCloud {
    let mut cloud = PointCloud::new();
    let ground = |x: f64, y: f64| 42.0 + 0.03 * x - 0.02 * y;
    for i in 0..=60 {
        for j in 0..=60 {
            let x = i as f64 + ((i * 7 + j * 3) % 5) as f64 * 0.03;
            let y = j as f64 + ((i * 3 + j * 11) % 7) as f64 * 0.03;
            cloud.push(x, y, ground(x, y), GROUND_CLASS);
        }
    }
    for &(cx, cy, height, radius) in trees {
        let steps = (radius / 0.5) as i32;
        for i in -steps..=steps {
            for j in -steps..=steps {
                let (dx, dy) = (i as f64 * 0.5, j as f64 * 0.5);
                let d = (dx * dx + dy * dy).sqrt();
                if d <= radius {
                    let (x, y) = (cx + dx, cy + dy);
                    let crown = height * (1.0 - 0.6 * d / radius);
                    cloud.push(x, y, ground(x, y) + crown, VEGETATION_CLASS);
                }
            }
        }
    }
    cloud
}

/// Example: detecting trees in a synthetic classified point cloud
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== Example: Tree detection on a synthetic plot ===\n");

    let truth = [
        (12.0, 14.0, 21.0, 4.5),
        (35.0, 20.0, 16.0, 3.5),
        (22.0, 44.0, 18.5, 4.0),
        (48.0, 48.0, 9.0, 2.5),
    ];
    let cloud = synthetic_plot(&truth);
    println!("Point cloud: {} points", cloud.len());

    let config = InventoryConfig::default();
    let inventory = TreeInventory::run(&cloud, &config, &NoAllometry)?;

    println!("\nDetected {} trees (expected {}):", inventory.trees.len(), truth.len());
    for tree in &inventory.trees {
        println!(
            "  - #{} at ({:.1}, {:.1}) height {:.1} m, crown {:.1} m, {} points",
            tree.id,
            tree.x,
            tree.y,
            tree.height,
            tree.crown_diameter.unwrap_or(0.0),
            tree.point_count
        );
    }
    println!("\nDiagnostics: {}", serde_json::to_string_pretty(&inventory.diagnostics)?);

    std::fs::create_dir_all("./output")?;
    inventory.write_geojson("./output/trees.geojson")?;

    Ok(())
}
