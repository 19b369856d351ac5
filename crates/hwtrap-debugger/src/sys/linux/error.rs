use nix::errno::Errno;

use crate::common::target::TargetError;

impl From<Errno> for TargetError {
    fn from(errno: Errno) -> Self {
        match errno {
            Errno::ESRCH => Self::Gone,
            Errno::ECHILD => Self::NoTracees,
            Errno::EPERM => Self::NotPermitted,
            errno => Self::Os(errno.into()),
        }
    }
}
