//! Lifecycle through the process-wide registry with an in-memory provider.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Once};

use bootwire_core::{
    Application, BootstrapError, Bootstrapper, BoxedConnection, Configuration,
    ConfigurationBuilder, ConnectionInfo, Instance, InstanceControl, LifecycleState, Pending,
    ProviderDescriptor, ProviderRegistry, StopCompletion, Value,
};
use uuid::Uuid;

/// Pretends to bind: hands out ports from a counter, exposes no native handle.
struct MemoryProvider {
    next_port: AtomicI32,
}

struct MemoryControl;

impl InstanceControl for MemoryControl {
    fn stop(&self, completion: StopCompletion) -> Pending<Option<Value>> {
        Pending::spawn(&tokio::runtime::Handle::current(), async move {
            tokio::task::yield_now().await;
            completion.complete();
            Ok(None)
        })
    }
}

impl Bootstrapper for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn configuration_builder(&self) -> ConfigurationBuilder {
        Configuration::builder().host("memory.local")
    }

    fn bootstrap(
        &self,
        _application: Arc<dyn Application>,
        configuration: Configuration,
    ) -> Pending<Instance> {
        if configuration.protocol() != "HTTP" {
            let protocol = configuration.protocol().to_string();
            return Pending::failed(BootstrapError::UnsupportedProtocol(protocol));
        }
        let port = match configuration.port() {
            -1 => self.next_port.fetch_add(1, Ordering::SeqCst),
            requested => requested,
        };
        Pending::from_future(async move {
            tokio::task::yield_now().await;
            let running = configuration.to_builder().port(port).build();
            Ok(Instance::new(Uuid::new_v4(), running, None, MemoryControl))
        })
    }
}

struct Hello;

impl Application for Hello {
    fn name(&self) -> &str {
        "hello"
    }

    fn handle<'a>(
        &'a self,
        _connection: BoxedConnection,
        _info: ConnectionInfo,
    ) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }
}

fn install() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        ProviderRegistry::global()
            .register(ProviderDescriptor::new("memory", || {
                Ok(Arc::new(MemoryProvider {
                    next_port: AtomicI32::new(40000),
                }) as Arc<dyn Bootstrapper>)
            }))
            .expect("registry should accept the first provider");
    });
}

#[tokio::test]
async fn concurrent_starts_are_independent() {
    install();
    let config_a = Configuration::builder().port(8081).root_path("/a").build();
    let config_b = Configuration::builder().port(8082).root_path("/b").build();

    let start_a = bootwire_core::start(Arc::new(Hello), config_a).unwrap();
    let start_b = bootwire_core::start(Arc::new(Hello), config_b).unwrap();
    let (a, b) = tokio::join!(start_a, start_b);
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.id(), b.id());
    assert_eq!(a.configuration().port(), 8081);
    assert_eq!(a.configuration().root_path(), "/a");
    assert_eq!(b.configuration().port(), 8082);
    assert_eq!(b.configuration().root_path(), "/b");

    a.stop().await.unwrap();
    assert_eq!(a.state(), LifecycleState::Stopped);
    assert_eq!(b.state(), LifecycleState::Running);

    b.stop().await.unwrap();
}

#[tokio::test]
async fn sentinel_port_is_replaced_by_assigned_port() {
    install();
    let instance = bootwire_core::start(Arc::new(Hello), Configuration::default())
        .unwrap()
        .await
        .unwrap();
    assert!(instance.configuration().port() >= 40000);
    instance.stop().await.unwrap();
}

#[tokio::test]
async fn second_stop_fails_through_future() {
    install();
    let instance = bootwire_core::start(Arc::new(Hello), Configuration::default())
        .unwrap()
        .await
        .unwrap();

    let result = instance.stop().await.unwrap();
    assert!(result.unwrap_native::<String>().unwrap().is_none());
    assert!(instance.unwrap_native::<String>().unwrap().is_none());

    let again = instance.stop();
    assert!(matches!(again.await, Err(BootstrapError::AlreadyStopped(_))));
}

#[tokio::test]
async fn provider_failure_arrives_through_future() {
    install();
    let config = Configuration::builder().protocol("GOPHER").build();
    let pending = bootwire_core::start(Arc::new(Hello), config).expect("discovery succeeds");
    assert!(matches!(
        pending.await,
        Err(BootstrapError::UnsupportedProtocol(ref p)) if p == "GOPHER"
    ));
}

#[tokio::test]
async fn fire_and_forget_stop_completes() {
    install();
    let instance = bootwire_core::start(Arc::new(Hello), Configuration::default())
        .unwrap()
        .await
        .unwrap();

    drop(instance.stop());
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while instance.state() != LifecycleState::Stopped {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("instance should reach Stopped without awaiting stop()");
}

#[tokio::test]
async fn start_then_stop_composes() {
    install();
    let stopped = bootwire_core::start(Arc::new(Hello), Configuration::default())
        .unwrap()
        .compose(|instance| instance.stop())
        .then(|result| result.instance_id());
    assert!(!stopped.await.unwrap().is_nil());
}

#[test]
fn provider_builder_is_pre_seeded() {
    install();
    let config = bootwire_core::builder().unwrap().port(9000).build();
    assert_eq!(config.host(), "memory.local");
    assert_eq!(config.port(), 9000);
}

#[test]
fn late_registration_is_rejected_once_resolved() {
    install();
    ProviderRegistry::global().locate().unwrap();
    let err = ProviderRegistry::global()
        .register(ProviderDescriptor::new("late", || {
            Err(BootstrapError::Unsupported("never built".into()))
        }))
        .unwrap_err();
    assert!(matches!(err, BootstrapError::RegistryLocked(_)));
}
