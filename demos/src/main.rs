//! rankbench demo binary: the full CLI over the demo plug-ins

fn main() -> anyhow::Result<()> {
    rankbench_demos::register();
    rankbench::run()
}
