// SPDX-License-Identifier: Apache-2.0

pub(crate) mod cases;
pub(crate) mod handlers;
pub(crate) mod verifiers;
