// src/interception/grpc_status.rs
//! gRPC status code translation
//!
//! Maps the 17 canonical gRPC status codes to representative HTTP status
//! codes so RPC captures can be classified by severity alongside plain
//! HTTP traffic. Display only: nothing in the capture path branches on it.

/// Canonical gRPC status codes with their names and HTTP equivalents
const STATUS_TABLE: [(i32, &str, u16); 17] = [
    (0, "OK", 200),
    (1, "CANCELLED", 499),
    (2, "UNKNOWN", 500),
    (3, "INVALID_ARGUMENT", 400),
    (4, "DEADLINE_EXCEEDED", 504),
    (5, "NOT_FOUND", 404),
    (6, "ALREADY_EXISTS", 409),
    (7, "PERMISSION_DENIED", 403),
    (8, "RESOURCE_EXHAUSTED", 429),
    (9, "FAILED_PRECONDITION", 400),
    (10, "ABORTED", 409),
    (11, "OUT_OF_RANGE", 400),
    (12, "UNIMPLEMENTED", 501),
    (13, "INTERNAL", 500),
    (14, "UNAVAILABLE", 503),
    (15, "DATA_LOSS", 500),
    (16, "UNAUTHENTICATED", 401),
];

/// gRPC `UNKNOWN`, used when a failure carries no status
pub const UNKNOWN: i32 = 2;

/// HTTP-like status for a gRPC code; 500 for codes outside the table
pub fn grpc_status_to_http(code: i32) -> u16 {
    lookup(code).map(|(_, _, http)| http).unwrap_or(500)
}

/// Canonical name for a gRPC code; `UNKNOWN` outside the table
pub fn grpc_status_name(code: i32) -> &'static str {
    lookup(code).map(|(_, name, _)| name).unwrap_or("UNKNOWN")
}

fn lookup(code: i32) -> Option<(i32, &'static str, u16)> {
    usize::try_from(code)
        .ok()
        .and_then(|index| STATUS_TABLE.get(index))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_indexed_by_code() {
        for (index, (code, _, _)) in STATUS_TABLE.iter().enumerate() {
            assert_eq!(*code as usize, index);
        }
    }

    #[test]
    fn test_known_codes() {
        assert_eq!(grpc_status_to_http(0), 200);
        assert_eq!(grpc_status_to_http(5), 404);
        assert_eq!(grpc_status_to_http(7), 403);
        assert_eq!(grpc_status_to_http(8), 429);
        assert_eq!(grpc_status_to_http(12), 501);
        assert_eq!(grpc_status_to_http(14), 503);
        assert_eq!(grpc_status_to_http(16), 401);
    }

    #[test]
    fn test_server_side_failures_map_to_500() {
        for code in [2, 13, 15] {
            assert_eq!(grpc_status_to_http(code), 500);
        }
    }

    #[test]
    fn test_unknown_codes_map_to_500() {
        assert_eq!(grpc_status_to_http(99), 500);
        assert_eq!(grpc_status_to_http(-1), 500);
        assert_eq!(grpc_status_name(99), "UNKNOWN");
    }

    #[test]
    fn test_names() {
        assert_eq!(grpc_status_name(0), "OK");
        assert_eq!(grpc_status_name(5), "NOT_FOUND");
        assert_eq!(grpc_status_name(16), "UNAUTHENTICATED");
    }
}
