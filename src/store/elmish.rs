//! Elmish stores - model/update/command loop on top of [`Store`].
//!
//! `init` and `update` are pure: they return the next model plus a
//! [`Cmd`] describing side effects. Dispatching a message runs `update`,
//! stores the model (notifying views), then executes the commands.

use std::rc::Rc;

use super::observable::Store;
use super::promise::ObservablePromise;
use crate::error::SutilError;

/// Message sink handed to views and commands.
pub type Dispatch<Msg> = Rc<dyn Fn(Msg)>;

type Effect<Msg> = Box<dyn FnOnce(Dispatch<Msg>)>;

/// A batch of side effects that may dispatch further messages.
pub struct Cmd<Msg> {
    effects: Vec<Effect<Msg>>,
}

impl<Msg: 'static> Cmd<Msg> {
    pub fn none() -> Self {
        Self { effects: Vec::new() }
    }

    /// Dispatch `msg` right after the current update.
    pub fn of_msg(msg: Msg) -> Self {
        Self::of_effect(move |dispatch| dispatch(msg))
    }

    /// Arbitrary side effect.
    pub fn of_effect(effect: impl FnOnce(Dispatch<Msg>) + 'static) -> Self {
        Self { effects: vec![Box::new(effect)] }
    }

    /// Dispatch `on_ok`/`on_err` when `promise` settles.
    pub fn of_promise<T>(
        promise: ObservablePromise<T>,
        on_ok: impl FnOnce(T) -> Msg + 'static,
        on_err: impl FnOnce(SutilError) -> Msg + 'static,
    ) -> Self
    where
        T: Clone + PartialEq + 'static,
    {
        Self::of_effect(move |dispatch| {
            promise.on_settled(move |outcome| match outcome {
                Ok(value) => dispatch(on_ok(value)),
                Err(error) => dispatch(on_err(error)),
            });
        })
    }

    pub fn batch(cmds: impl IntoIterator<Item = Cmd<Msg>>) -> Self {
        Self {
            effects: cmds.into_iter().flat_map(|c| c.effects).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Run every effect with `dispatch`.
    pub fn exec(self, dispatch: &Dispatch<Msg>) {
        for effect in self.effects {
            effect(dispatch.clone());
        }
    }
}

type UpdateFn<Model, Msg> = Rc<dyn Fn(Msg, &Model) -> (Model, Cmd<Msg>)>;

/// An Elm-style program bound to a model store.
pub struct Elmish<Model: Clone + PartialEq + 'static, Msg: 'static> {
    model: Store<Model>,
    update: UpdateFn<Model, Msg>,
}

impl<Model: Clone + PartialEq + 'static, Msg: 'static> Clone for Elmish<Model, Msg> {
    fn clone(&self) -> Self {
        Self { model: self.model.clone(), update: self.update.clone() }
    }
}

impl<Model: Clone + PartialEq + 'static, Msg: 'static> Elmish<Model, Msg> {
    pub fn model(&self) -> &Store<Model> {
        &self.model
    }

    /// Run one update cycle.
    pub fn dispatch(&self, msg: Msg) {
        let current = self.model.get();
        let (next, cmd) = (self.update)(msg, &current);
        self.model.set(next);
        cmd.exec(&self.dispatcher());
    }

    /// A cloneable dispatch closure.
    pub fn dispatcher(&self) -> Dispatch<Msg> {
        let me = self.clone();
        Rc::new(move |msg| me.dispatch(msg))
    }
}

/// Create an Elmish program; the initial command runs before returning.
pub fn make_elmish<Props, Model, Msg>(
    props: Props,
    init: impl FnOnce(Props) -> (Model, Cmd<Msg>),
    update: impl Fn(Msg, &Model) -> (Model, Cmd<Msg>) + 'static,
) -> (Store<Model>, Dispatch<Msg>)
where
    Model: Clone + PartialEq + 'static,
    Msg: 'static,
{
    let program = make_program(props, init, update);
    (program.model.clone(), program.dispatcher())
}

/// Like [`make_elmish`] but returns the program handle.
pub fn make_program<Props, Model, Msg>(
    props: Props,
    init: impl FnOnce(Props) -> (Model, Cmd<Msg>),
    update: impl Fn(Msg, &Model) -> (Model, Cmd<Msg>) + 'static,
) -> Elmish<Model, Msg>
where
    Model: Clone + PartialEq + 'static,
    Msg: 'static,
{
    let (model, cmd) = init(props);
    let program = Elmish {
        model: Store::named("elmish-model", model),
        update: Rc::new(update),
    };
    cmd.exec(&program.dispatcher());
    program
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum Msg {
        Increment,
        Add(i32),
        Reset,
    }

    fn update(msg: Msg, model: &i32) -> (i32, Cmd<Msg>) {
        match msg {
            Msg::Increment => (model + 1, Cmd::none()),
            Msg::Add(n) => (model + n, Cmd::of_msg(Msg::Increment)),
            Msg::Reset => (0, Cmd::none()),
        }
    }

    #[test]
    fn test_dispatch_updates_model() {
        let (model, dispatch) = make_elmish((), |_| (0, Cmd::none()), update);
        dispatch(Msg::Increment);
        dispatch(Msg::Increment);
        assert_eq!(model.get(), 2);

        dispatch(Msg::Reset);
        assert_eq!(model.get(), 0);
    }

    #[test]
    fn test_commands_run_after_update() {
        let (model, dispatch) = make_elmish((), |_| (0, Cmd::none()), update);
        dispatch(Msg::Add(10));
        assert_eq!(model.get(), 11, "Add dispatches a follow-up Increment");
    }

    #[test]
    fn test_init_command_runs() {
        let (model, _dispatch) = make_elmish(5, |start| (start, Cmd::of_msg(Msg::Increment)), update);
        assert_eq!(model.get(), 6);
    }

    #[test]
    fn test_of_promise_dispatches_on_settle() {
        let promise: ObservablePromise<i32> = ObservablePromise::new();
        let promise_clone = promise.clone();
        let (model, _dispatch) = make_elmish(
            (),
            move |_| {
                (0, Cmd::of_promise(promise_clone, Msg::Add, |_| Msg::Reset))
            },
            update,
        );
        assert_eq!(model.get(), 0);

        promise.resolve(4);
        assert_eq!(model.get(), 5);
    }

    #[test]
    fn test_batch_preserves_order() {
        let (model, dispatch) = make_elmish((), |_| (1, Cmd::none()), |msg: Msg, m: &i32| match msg {
            Msg::Reset => (*m, Cmd::batch([Cmd::of_msg(Msg::Add(0)), Cmd::of_msg(Msg::Increment)])),
            other => update(other, m),
        });
        dispatch(Msg::Reset);
        // Add(0) -> +0 and a follow-up Increment, then Increment
        assert_eq!(model.get(), 3);
    }
}
