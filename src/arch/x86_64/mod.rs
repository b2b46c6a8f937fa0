/*
 * x86_64 Architecture Support Module
 *
 * x86_64-specific code for the clock core.
 *
 * Submodules:
 * - tsc: timestamp counter access
 */

pub mod tsc;
