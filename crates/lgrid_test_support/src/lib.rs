pub mod fake_host;
pub mod fake_transport;
pub mod fixtures;

pub use fake_host::{FakePolicy, RecordingShell};
pub use fake_transport::{FakeReply, FakeTransport};
pub use fixtures::{FakeHost, Person, page_response, people, person_fields};
