// Create the Error, ErrorKind, ResultExt, and Result types
error_chain! {
    types {
        Error, ErrorKind, ResultExt;
    }
    foreign_links {
        Io(::std::io::Error);
        Cbor(::serde_cbor::error::Error);
        Json(::serde_json::Error);
        AddrParse(::std::net::AddrParseError);
    }

    errors {
        InvalidTaskId(id: String) {
            description("malformed task id")
            display("malformed task id: {:?}", id)
        }
    }
}

// Explicit alias just to make the IDEs happier
pub type Result<T> = ::std::result::Result<T, Error>;
