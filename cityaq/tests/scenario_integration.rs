//! End-to-end scenario: a marginal roadways simulation for Accra.
//!
//! Run with: `cargo test --test scenario_integration`

mod common;

use std::sync::atomic::Ordering;

use tokio_util::sync::CancellationToken;

use cityaq::jobs::SimulationResult;
use cityaq::service::{ImpactRequest, PopulationRequest};
use cityaq::types::{Emission, SimulationType};

use common::{accra_boundary, harness, CountingModel, ACCRA};

const SOURCE: &str = "roadways";

fn pm25() -> ImpactRequest {
    ImpactRequest {
        city: ACCRA.into(),
        emission: Emission::PM2_5,
        source_type: SOURCE.into(),
        simulation_type: SimulationType::CityMarginal,
    }
}

fn assert_aligned(result: &SimulationResult) {
    let n = result.grid.len();
    for (name, values) in [
        ("population", &result.population),
        ("primary_pm25", &result.primary_pm25),
        ("soa", &result.soa),
        ("pnh4", &result.pnh4),
        ("pno3", &result.pno3),
        ("pso4", &result.pso4),
    ] {
        assert_eq!(values.len(), n, "{name} not aligned with the grid");
    }
}

#[tokio::test]
async fn test_marginal_pm25_scenario() {
    let h = harness(CountingModel::default()).await;
    let cancel = CancellationToken::new();

    let result = h
        .service
        .simulation(ACCRA, SOURCE, SimulationType::CityMarginal, &cancel)
        .await
        .unwrap();
    assert!(!result.is_empty());
    assert_aligned(&result);

    // The screening model maps each cell's emission straight onto its
    // concentration, so the field sums to 0.75 x 1e6 kg spread over the
    // 366 days of 2016, in kg/s.
    let field = h.service.gridded_concentrations(&pm25(), &cancel).await.unwrap();
    let total: f64 = field.values.iter().sum();
    assert!((total - 0.023717364905889497).abs() < 1e-10, "{total}");

    // Output rows follow the emissions grid.
    let grid = h.service.emissions_grid(ACCRA, SOURCE).await.unwrap();
    assert_eq!(field.grid.len(), grid.len());
    for (out, cell) in field.grid.iter().zip(&grid) {
        let (a, b) = (out.centroid().unwrap(), cell.centroid().unwrap());
        assert!((a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_scenario_is_deterministic() {
    let a = harness(CountingModel::default()).await;
    let b = harness(CountingModel::default()).await;
    let cancel = CancellationToken::new();

    let first = a.service.gridded_concentrations(&pm25(), &cancel).await.unwrap();
    let second = b.service.gridded_concentrations(&pm25(), &cancel).await.unwrap();
    assert_eq!(first, second);

    let sum = |v: &[f64]| v.iter().sum::<f64>();
    assert_eq!(sum(&first.values).to_bits(), sum(&second.values).to_bits());
}

#[tokio::test]
async fn test_population_and_impacts() {
    let h = harness(CountingModel::default()).await;
    let cancel = CancellationToken::new();

    let population = h
        .service
        .gridded_population(
            &PopulationRequest {
                city: ACCRA.into(),
                source_type: SOURCE.into(),
                simulation_type: SimulationType::CityMarginal,
            },
            &cancel,
        )
        .await
        .unwrap();
    let total_population: f64 = population.values.iter().sum();

    let summary = h.service.impact_summary(&pm25(), &cancel).await.unwrap();
    assert!((summary.population - total_population).abs() < 1e-6);
    assert!(summary.city_population > 0.0);
    assert!(summary.city_population < summary.population);
    assert!(summary.city_intake_fraction > 0.0);
    assert!(summary.total_intake_fraction >= summary.city_intake_fraction);

    // One simulation served all three queries.
    assert_eq!(h.model.runs(), 1);
}

#[tokio::test]
async fn test_total_simulation_covers_domain() {
    let h = harness(CountingModel::default()).await;
    let result = h
        .service
        .simulation(ACCRA, SOURCE, SimulationType::Total, &CancellationToken::new())
        .await
        .unwrap();
    // 36 x 36 outer nest, one inventory sector.
    assert_eq!(result.len(), 36 * 36);
    assert_aligned(&result);
    assert!(result.primary_pm25.iter().all(|&v| v == 0.75));
}

#[tokio::test]
async fn test_city_total_is_masked_to_city() {
    let h = harness(CountingModel::default()).await;
    let result = h
        .service
        .simulation(ACCRA, SOURCE, SimulationType::CityTotal, &CancellationToken::new())
        .await
        .unwrap();
    assert!(!result.is_empty());
    assert!(result.len() < 36 * 36);
    assert_aligned(&result);

    let city = accra_boundary().bounds().unwrap();
    for cell in &result.grid {
        assert!(cell.bounds().unwrap().overlaps(&city));
    }
}

#[tokio::test]
async fn test_empty_output_is_an_error_and_not_cached() {
    let h = harness(CountingModel::default()).await;
    h.model.empty.store(true, Ordering::SeqCst);
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        let err = h
            .service
            .simulation(ACCRA, SOURCE, SimulationType::CityMarginal, &cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no grid cells"), "{err}");
    }
    assert_eq!(h.model.runs(), 2);

    // A later good run is computed and served normally.
    h.model.empty.store(false, Ordering::SeqCst);
    let result = h
        .service
        .simulation(ACCRA, SOURCE, SimulationType::CityMarginal, &cancel)
        .await
        .unwrap();
    assert!(!result.is_empty());
    assert_eq!(h.model.runs(), 3);
}

#[tokio::test]
async fn test_unknown_inventory_sector_fails() {
    let h = harness(CountingModel::default()).await;
    let err = h
        .service
        .simulation(ACCRA, "shipping", SimulationType::CityTotal, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("shipping"));
    assert_eq!(h.model.runs(), 0);
}
