//! Built-in element types.

pub mod fakesink;
pub mod identity;
pub mod logsink;
pub mod testsrc;
pub mod volume;

pub use fakesink::FakeSink;
pub use identity::Identity;
pub use logsink::LogSink;
pub use testsrc::TestSource;
pub use volume::Volume;

use crate::factory::ElementFactoryRegistry;

pub fn register_builtins(registry: &mut ElementFactoryRegistry) {
    registry.register::<TestSource>();
    registry.register::<Volume>();
    registry.register::<Identity>();
    registry.register::<FakeSink>();
    registry.register::<LogSink>();
}
