// End-to-end integration tests for the Audiocast Backend API
//
// Each test gets its own server on an ephemeral port, backed by JSON
// documents and a filesystem artifact store inside a temp directory, with a
// scripted speech provider standing in for Google/Polly. Tests share no
// state and run in parallel.
//
// The PostgreSQL repository tests start a testcontainers instance and are
// ignored by default.

mod helpers;
mod test_health;
mod test_narrate;
mod test_repositories;
mod test_usage;
