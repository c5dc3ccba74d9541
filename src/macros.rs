macro_rules! invalid_data {
    ($e:expr) => {
        return Err(::std::io::Error::new(
            ::std::io::ErrorKind::InvalidData,
            $e,
        )
        .into())
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err(::std::io::Error::new(
            ::std::io::ErrorKind::InvalidData,
            format!($fmt, $($arg)+),
        )
        .into())
    };
}

macro_rules! config_err {
    ($e:expr) => {
        return Err($crate::error::CabError::Config($e.to_string()))
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::error::CabError::Config(format!($fmt, $($arg)+)))
    };
}

macro_rules! state_err {
    ($e:expr) => {
        return Err($crate::error::CabError::State($e.to_string()))
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::error::CabError::State(format!($fmt, $($arg)+)))
    };
}
