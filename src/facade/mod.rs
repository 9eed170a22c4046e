mod mapper;

pub use mapper::Mapper;
