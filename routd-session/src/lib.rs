//! Session lifecycle engine.
//!
//! A session id encodes its ttl and creation timestamp in its trailing
//! characters, so any holder of a sid can recover the session metadata
//! without a store round trip. Durable state lives behind the [`Store`]
//! abstraction; the in-memory [`ShmStore`] is the reference backend and
//! remote hashmap stores plug in through the same trait.
//!
//! On top of the core value operations sit two layers:
//!
//! - the **user layer**: login rotates the sid (fixation resistance),
//!   a uid → sids reverse index tracks every live session of a user, and
//!   `sync` fans an updated user blob out to all of them;
//! - the **connection layer**: stream transports keep a connection-
//!   scoped shadow session and clone it per request; a request-side sid
//!   rotation is propagated back into the shadow so disconnect cleanup
//!   operates on the current sid.
//!
//! [`AutoRenew`] rotates long-lived sids on a fixed interval while
//! letting concurrent requests on the old sid catch up inside a grace
//! window.

pub mod auto;
pub mod connection;
pub mod session;
pub mod shm;
pub mod store;
pub mod user;

pub use auto::{AutoRenew, AutoRenewConfig};
pub use session::{
    gen_sid, Session, CLIENT_FIELD, DEFAULT_TTL_MINUTES, MIN_SID_LEN, NEW_SID_FIELD, SERVER_FIELD,
    USER_FIELD,
};
pub use shm::ShmStore;
pub use store::Store;
pub use user::{SimpleUser, UidUser};

pub use routd_x::Error;
