//! API request handlers

pub mod access;
pub mod keys;
pub mod services;
pub mod tickets;

pub use access::{
    check_access, grant_access, revoke_access, AccessPairRequest, CheckAccessResponse,
    GrantRequest, OkResponse,
};
pub use keys::{
    get_public_key, list_rotations, rotate_key, ListRotationsResponse, PublicKeyResponse,
    RotateKeyResponse, RotationView,
};
pub use services::{
    get_service, list_services, register_service, update_service, ListServicesResponse,
    RegisterServiceRequest, RegisterServiceResponse, ServiceView, UpdateServiceRequest,
};
pub use tickets::{
    issue_ticket, validate_ticket, IssueTicketRequest, IssueTicketResponse,
    ValidateTicketRequest, ValidateTicketResponse,
};
