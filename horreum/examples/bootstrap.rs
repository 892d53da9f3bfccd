//! Bootstrap walkthrough: blueprints, bindings, groups and events.

use std::sync::Arc;

use horreum::prelude::*;

// === Define your traits and types ===

trait Logger: Send + Sync {
    fn log(&self, msg: &str);
}

#[derive(Clone)]
struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, msg: &str) {
        println!("[LOG] {msg}");
    }
}

#[derive(Clone)]
struct Config {
    database_url: String,
}

#[derive(Clone)]
struct Database {
    url: String,
    logger: Arc<dyn Logger>,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        self.logger.log(&format!("Executing: {sql}"));
        format!("Results from {}", self.url)
    }
}

trait Check: Send + Sync {
    fn name(&self) -> &'static str;
}

#[derive(Clone)]
struct DiskCheck;

impl Check for DiskCheck {
    fn name(&self) -> &'static str {
        "disk"
    }
}

#[derive(Clone)]
struct NetworkCheck;

impl Check for NetworkCheck {
    fn name(&self) -> &'static str {
        "network"
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("horreum=debug")
        .init();

    let container = Container::new();

    // Declare how concrete classes are constructed.
    container.register_blueprint(
        Blueprint::of::<ConsoleLogger>()
            .implements::<Arc<dyn Logger>>(|l| Arc::new(l.clone()))
            .constructor(|_| Ok(ConsoleLogger)),
    );
    container.register_blueprint(
        Blueprint::of::<Database>()
            .param(ParamSpec::service::<Config>("config"))
            .param(ParamSpec::service::<Arc<dyn Logger>>("logger"))
            .constructor(|args| {
                let config: Config = args.get(0)?;
                Ok(Database {
                    url: config.database_url,
                    logger: args.get(1)?,
                })
            }),
    );

    // Config — an already-built instance.
    container.bind_shared::<Config>(Target::Instance(Instance::of(Config {
        database_url: "postgres://localhost/myapp".to_string(),
    })))?;

    // Logger — singleton bound to its conventional implementation.
    container
        .bind_shared::<Arc<dyn Logger>>(Target::Class(ServiceKey::of::<ConsoleLogger>()))?;

    // Database — autowired through its blueprint.
    container.bind_shared::<Database>(Target::Type)?;

    // Health checks — several providers under one type.
    container.bind_to_group::<Arc<dyn Check>>([
        Target::factory(|_, _| {
            Ok(Some(
                Instance::of(DiskCheck)
                    .implementing::<DiskCheck, Arc<dyn Check>>(|c| Arc::new(c.clone())),
            ))
        }),
        Target::factory(|_, _| {
            Ok(Some(
                Instance::of(NetworkCheck)
                    .implementing::<NetworkCheck, Arc<dyn Check>>(|c| Arc::new(c.clone())),
            ))
        }),
    ])?;

    // Watch instances get produced.
    container.after_any_resolving(|instance, _| {
        println!("resolved: {}", instance.class().short_name());
    });

    println!("{container:?}");

    let db: Database = container.get()?;
    println!("{}", db.query("SELECT * FROM users"));

    // Same singleton on every request.
    let db2: Database = container.get()?;
    println!("same url: {}", db.url == db2.url);

    container.each::<Arc<dyn Check>>(|check, _| {
        println!("check registered: {}", check.name());
    })?;

    for (name, description) in container.report().bindings {
        println!("{name} => {description}");
    }

    Ok(())
}
