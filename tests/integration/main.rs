mod common;

mod config_invalid_options;
mod http_redirects_to_https;
#[cfg(unix)]
mod https_serves_cib;
mod lib_already_bound_port;
