use anyhow::Result;
use chrono::NaiveDate;
use rsforest::change::series::{Epoch, TimeSeries};
use rsforest::config::MatchingConfig;
use rsforest::geometric::trees::{Allometry, TreeRecord};

/// Toy allometry: DBH proportional to height, carbon from a cylinder volume
struct ToyAllometry;

impl Allometry for ToyAllometry {
    fn estimate_dbh(&self, height: f64) -> Option<f64> {
        (height > 1.3).then(|| 1.8 * height)
    }

    fn estimate_carbon_kg(&self, tree: &TreeRecord) -> Option<f64> {
        let dbh_m = self.estimate_dbh(tree.height)? / 100.0;
        // 0.5 form factor, 500 kg/m3 wood density, 50 % carbon fraction
        let volume = 0.5 * std::f64::consts::PI * (dbh_m / 2.0).powi(2) * tree.height;
        Some(volume * 500.0 * 0.5)
    }
}

fn date(y: i32, m: u32, d: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| anyhow::anyhow!("invalid date {}-{}-{}", y, m, d))
}

/// Example: tracking individual trees across three acquisitions
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== Example: Tree change across epochs ===\n");

    let stand = |trees: &[(f64, f64, f64)]| -> Vec<TreeRecord> {
        trees
            .iter()
            .enumerate()
            .map(|(i, &(x, y, h))| TreeRecord::new(i as u32 + 1, x, y, h))
            .collect()
    };

    let series = TimeSeries::new(
        vec![
            Epoch::new(
                "2015",
                date(2015, 6, 15)?,
                stand(&[(10.0, 10.0, 12.0), (20.0, 12.0, 18.0), (32.0, 8.0, 15.0), (40.0, 30.0, 9.0)]),
            ),
            Epoch::new(
                "2019",
                date(2019, 6, 20)?,
                stand(&[(10.5, 10.2, 13.0), (20.2, 11.8, 18.3), (31.7, 8.4, 12.5), (5.0, 40.0, 3.5)]),
            ),
            Epoch::new(
                "2023",
                date(2023, 7, 2)?,
                stand(&[(10.3, 10.0, 14.1), (20.0, 12.1, 18.4), (5.2, 39.8, 5.0)]),
            ),
        ],
        0.25,
    );

    let changes = series.analyze(&MatchingConfig::default(), &ToyAllometry)?;
    for change in &changes {
        let stats = &change.statistics;
        println!("{} -> {} ({:.2} years)", change.from, change.to, change.years);
        println!(
            "  - matched {}: growth {}, stable {}, decline {}",
            stats.matched_count, stats.growth_count, stats.stable_count, stats.decline_count
        );
        println!(
            "  - mortality {} ({:.2} %/yr), ingrowth {} ({:.2} %/yr)",
            stats.mortality_count, stats.mortality_rate_pct, stats.ingrowth_count, stats.ingrowth_rate_pct
        );
        println!(
            "  - net carbon {:.1} kg, sequestration {:.1} kg/ha/yr",
            stats.net_carbon_change_kg, stats.sequestration_rate
        );
        if let Some(growth) = stats.mean_annual_height_growth {
            println!("  - mean height growth {:.2} m/yr", growth);
        }
        let confidence = change.matches.confidence_summary();
        println!(
            "  - match confidence: {} high, {} medium, {} low\n",
            confidence.high, confidence.medium, confidence.low
        );
    }

    Ok(())
}
