use candle_core::Device;

use planetoid_data::datasets::{FullBatchLoader, Planetoid, PlanetoidKind, PlanetoidParams, Split};

// cargo run --example planetoid -- CiteSeer datasets full
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let kind = args.next().as_deref().unwrap_or("Cora").parse::<PlanetoidKind>()?;
    let root = args.next().unwrap_or_else(|| "datasets".to_owned());
    let split = args.next().as_deref().unwrap_or("public").parse::<Split>()?;

    let params = PlanetoidParams {
        split,
        device: Device::Cpu,
        ..Default::default()
    };
    let dataset = Planetoid::with_params(&root, kind, params)?;

    for data in FullBatchLoader::new(&dataset) {
        let data = data?;
        println!("{dataset} ({} split)", dataset.split());
        println!(
            "  nodes: {:6} features: {:5} classes: {:2} edges: {:6}",
            data.num_nodes(),
            data.num_features(),
            data.num_classes()?,
            data.num_edges(),
        );
        println!(
            "  train: {:6} val: {:5} test: {:5}",
            data.train_indices()?.dims1()?,
            data.val_indices()?.dims1()?,
            data.test_indices()?.dims1()?,
        );
    }
    Ok(())
}
