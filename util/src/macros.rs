/// Prints a startup line to stderr before tracing is up.
#[macro_export]
macro_rules! bootstrap {
    ($x:expr $( , $xs:expr )* $(,)?) => {
        eprintln!("[{} bootstrap] {}", $crate::build::PACKAGE, format_args!($x $( , $xs )*))
    };
}

/// Logs an `Err` without consuming or propagating it. Logs at error level
/// unless a level is given first.
#[macro_export]
macro_rules! trace_catch {
    (level: $level:ident, $val:expr, $($rest:tt)*) => {
        if let Err(ref e) = $val {
            ::tracing::$level!(error = %e, $($rest)*);
        }
    };

    ($val:expr, $($rest:tt)*) => {
        if let Err(ref e) = $val {
            ::tracing::error!(error = %e, $($rest)*);
        }
    };
}
