use fibra_core::{Element, MemoryHost, Root, RootError};
use fibra_demo::{app, click, html};
use fibra_runtime_std::StdRuntime;

fn main() -> Result<(), RootError> {
    #[cfg(feature = "logging")]
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    println!("=== Fibra Demo ===");
    println!("Each step clicks a button and prints the committed host tree.");
    println!();

    let runtime = StdRuntime::new();
    let mut host = MemoryHost::new();
    let container = host.create_container();
    let root = Root::mount(host, container, runtime.scheduler())?;

    root.render(Element::component(&app()))?;
    runtime.run_until_idle();
    println!("mounted:\n  {}", html(&root));

    let steps = [
        "increment", "add", "add", "add", "reverse", "remove-2", "increment",
    ];
    for id in steps {
        if !click(&root, id) {
            log::warn!("no element with id {id}");
            continue;
        }
        runtime.run_until_idle();
        if let Some(err) = root.take_render_error() {
            log::error!("render failed after clicking {id}: {err}");
        }
        println!("after {id}:\n  {}", html(&root));
    }

    root.with_host(|host| println!("\nhost operations recorded: {}", host.ops().len()));
    println!("work nodes alive: {}", root.live_work_nodes());

    root.unmount()?;
    runtime.run_until_idle();
    println!("unmounted:\n  {:?}", html(&root));
    Ok(())
}
