mod in_memory;
mod redis;

pub use self::redis::{create_pool, keys, RedisPool, RedisStatusStore};
pub use in_memory::InMemoryStatusStore;
