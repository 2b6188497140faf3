mod helpers;
mod tests_flush_api;
mod tests_reopen;
mod tests_stress;
