#[cfg(unix)]
mod analyze;
mod rules;
#[cfg(unix)]
mod serve_file;
