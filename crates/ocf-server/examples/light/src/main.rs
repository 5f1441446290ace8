use clap::Parser;

use tracing::{Level, info, warn};

use ocf::address::{Address, DeviceId};
use ocf::error::{Error, ErrorKind};
use ocf::info::DeviceInfo;
use ocf::loopback::Loopback;
use ocf::resource::ResourceInit;
use ocf::value::Object;

use ocf_client::{Client, FindResources, Resource};

use ocf_server::{RequestKind, Server, ServerRequest};

const DEVICE_ID: &str = "urn:ocf:light:1";
const SWITCH_TYPE: &str = "oic.r.switch.binary";

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Number of times the light is toggled by the device.
    #[arg(short, long, default_value_t = 3)]
    toggles: u32,

    /// Device port.
    #[arg(short, long, default_value_t = 5683)]
    port: u16,

    /// Log every request and notification.
    #[arg(short, long)]
    verbose: bool,
}

fn state(resource: &Resource) -> &'static str {
    match resource.property("value").and_then(|value| value.as_bool()) {
        Some(true) => "on",
        Some(false) => "off",
        None => "unknown",
    }
}

fn serve(server: &Server) {
    let responder = server.clone();
    server
        .events(RequestKind::Retrieve)
        .subscribe(move |request: &ServerRequest| {
            // Deregistrations expect no answer.
            if request.observe == Some(false) {
                return;
            }
            if let Err(e) = responder.respond(request, Some(&request.target.properties())) {
                warn!("Unable to answer retrieval {}: {e}", request.id);
            }
        });

    let responder = server.clone();
    server
        .events(RequestKind::Update)
        .subscribe(move |request: &ServerRequest| {
            let value = request
                .data
                .as_ref()
                .and_then(|data| data.get("value"))
                .and_then(|value| value.as_bool());

            let answer = match value {
                Some(value) => {
                    request.target.set_property("value", value);
                    responder.respond(request, Some(&request.target.properties()))
                }
                None => responder.respond_with_error(request, None),
            };
            if let Err(e) = answer {
                warn!("Unable to answer update {}: {e}", request.id);
            }
        });
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_target(false)
        .init();

    let device = Loopback::new(DEVICE_ID, Address::new("127.0.0.1").port(cli.port));

    // Device side.
    let server = Server::new(device.clone());
    server.set_device_info(&DeviceInfo {
        name: Some("light".into()),
        ..server.device_info()
    })?;
    let light = server.register(
        &ResourceInit::new("/light")
            .resource_type(SWITCH_TYPE)
            .interface("oic.if.baseline")
            .interface("oic.if.a")
            .discoverable()
            .observable()
            .properties(Object::new().with("value", false)),
    )?;
    serve(&server);

    // Controller side.
    let client = Client::new(device.clone());
    client.device_found().subscribe(|info: &DeviceInfo| {
        info!(
            "Found device `{}` ({}) at {}",
            info.uuid,
            info.name.as_deref().unwrap_or("unnamed"),
            info.url
        );
    });
    client.find_devices()?;

    let filter = FindResources::new().resource_type(SWITCH_TYPE);
    let Some(switch) = client
        .find_resources(&DeviceId::new(DEVICE_ID), &filter)
        .await?
        .pop()
    else {
        return Err(Error::new(
            ErrorKind::ResourceNotFound,
            format!("No `{SWITCH_TYPE}` resource on `{DEVICE_ID}`"),
        ));
    };

    let (switch, listener) = client
        .retrieve_and_observe(&switch, None, |resource: &Resource| {
            info!("`{}` is {}", resource.resource_path(), state(resource));
        })
        .await?;

    for toggle in 0..cli.toggles {
        light.set_property("value", toggle % 2 == 0);
        if let Err(errors) = server.notify(&light) {
            for e in errors {
                warn!("Notification failed: {e}");
            }
        }
    }

    switch.set_property("value", false);
    let switch = client.update(&switch).await?;
    info!("Switched `{}` {}", switch.resource_path(), state(&switch));

    switch.remove_update_listener(listener);
    server.unregister(&light)?;

    Ok(())
}
