use std::fmt::Debug;

pub trait ErrorUtils {
    fn print_error(&self, msg: &str);
}

impl<T, E: Debug> ErrorUtils for Result<T, E> {
    fn print_error(&self, msg: &str) {
        if let Err(e) = self {
            log::error!("Error: {} {:?}", msg, e);
        }
    }
}
