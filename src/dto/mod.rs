pub mod dispatch_dto;
